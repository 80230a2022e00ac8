//! LLM provider implementations for procmem.
//!
//! All providers implement the `procmem_core::Provider` trait.

pub mod openai_compat;

use procmem_config::ProviderConfig;
use procmem_core::error::ProviderError;
use procmem_core::provider::Provider;
use std::sync::Arc;

pub use openai_compat::OpenAiCompatProvider;

/// Build the configured provider. Fails with `NotConfigured` when no API key
/// is set and the endpoint is not a local one.
pub fn from_config(config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let is_local = config.api_url.contains("localhost") || config.api_url.contains("127.0.0.1");
    let api_key = match (&config.api_key, is_local) {
        (Some(key), _) if !key.is_empty() => key.clone(),
        (_, true) => "local".to_string(),
        _ => {
            return Err(ProviderError::NotConfigured(
                "no API key (set PROCMEM_API_KEY or provider.api_key)".into(),
            ));
        }
    };
    let provider = OpenAiCompatProvider::new("openai_compat", config.api_url.clone(), api_key)?;
    Ok(Arc::new(provider))
}
