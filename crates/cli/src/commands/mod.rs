pub mod context;
pub mod init;
pub mod learn;
pub mod memory;

use procmem_config::AppConfig;
use procmem_memory::FileStore;
use std::path::Path;

/// Load the config from `path` or the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_at(path),
        None => AppConfig::load(),
    };
    Ok(config.map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Open the configured memory file.
pub fn open_store(config: &AppConfig) -> Result<FileStore, Box<dyn std::error::Error>> {
    let path = config.memory_path();
    Ok(FileStore::open(&path).map_err(|e| format!("Failed to open {}: {e}", path.display()))?)
}
