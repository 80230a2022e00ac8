//! Configuration loading, validation, and management for procmem.
//!
//! Loads configuration from `~/.procmem/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.procmem/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM endpoint used for judge, extractor and sub-queries
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Memory store configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Context layer toggles and budgets
    #[serde(default)]
    pub context: ContextConfig,

    /// Closed-loop learning settings
    #[serde(default)]
    pub learning: LearningConfig,

    /// Execution limits for rollouts and sub-calls
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    /// Judge runs cold; extraction may run a little warmer.
    #[serde(default = "default_judge_temperature")]
    pub judge_temperature: f32,

    #[serde(default = "default_extract_temperature")]
    pub extract_temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_judge_temperature() -> f32 {
    0.0
}
fn default_extract_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    2048
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
            model: default_model(),
            judge_temperature: default_judge_temperature(),
            extract_temperature: default_extract_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field(
                "api_key",
                &match self.api_key {
                    Some(_) => "[REDACTED]",
                    None => "None",
                },
            )
            .field("model", &self.model)
            .field("judge_temperature", &self.judge_temperature)
            .field("extract_temperature", &self.extract_temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// JSONL file backing the store. Defaults to `~/.procmem/memory.jsonl`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Hits returned by the first retrieval phase
    #[serde(default = "default_search_k")]
    pub search_k: usize,

    /// Ceiling on records materialized by one `get`
    #[serde(default = "default_max_get")]
    pub max_get: usize,

    /// Reorder hits by curriculum level and domain
    #[serde(default = "default_true")]
    pub curriculum: bool,
}

fn default_search_k() -> usize {
    5
}
fn default_max_get() -> usize {
    3
}
fn default_true() -> bool {
    true
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            search_k: default_search_k(),
            max_get: default_max_get(),
            curriculum: true,
        }
    }
}

/// One context layer: on/off and a character budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub budget: usize,
}

impl LayerConfig {
    pub fn enabled(budget: usize) -> Self {
        Self {
            enabled: true,
            budget,
        }
    }

    pub fn disabled(budget: usize) -> Self {
        Self {
            enabled: false,
            budget,
        }
    }

    /// Budget this layer may consume, zero when disabled.
    pub fn effective_budget(&self) -> usize {
        if self.enabled { self.budget } else { 0 }
    }
}

/// How procedural memory reaches the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    /// The context builder retrieves and injects procedures.
    #[default]
    AutoInject,
    /// The agent calls `memory_search` / `memory_get` itself.
    ToolMediated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub retrieval_mode: RetrievalMode,

    #[serde(default = "default_orientation")]
    pub orientation: LayerConfig,

    #[serde(default = "default_constraints")]
    pub constraints: LayerConfig,

    #[serde(default = "default_memory_layer")]
    pub memory: LayerConfig,

    #[serde(default = "default_guide")]
    pub guide: LayerConfig,
}

fn default_orientation() -> LayerConfig {
    LayerConfig::enabled(1_500)
}
fn default_constraints() -> LayerConfig {
    LayerConfig::enabled(1_200)
}
fn default_memory_layer() -> LayerConfig {
    LayerConfig::enabled(2_500)
}
fn default_guide() -> LayerConfig {
    LayerConfig::enabled(3_000)
}

impl ContextConfig {
    /// Sum of the budgets of enabled layers: the hard ceiling on output size.
    pub fn total_budget(&self) -> usize {
        self.layers().iter().map(|(_, l)| l.effective_budget()).sum()
    }

    /// Layers in assembly order.
    pub fn layers(&self) -> [(&'static str, LayerConfig); 4] {
        [
            ("orientation", self.orientation),
            ("constraints", self.constraints),
            ("memory", self.memory),
            ("guide", self.guide),
        ]
    }

    /// Toggle a layer by name. Returns false for unknown names.
    pub fn set_enabled(&mut self, layer: &str, enabled: bool) -> bool {
        let slot = match layer {
            "orientation" | "l0" => &mut self.orientation,
            "constraints" | "l1" => &mut self.constraints,
            "memory" | "l2" => &mut self.memory,
            "guide" | "l3" => &mut self.guide,
            _ => return false,
        };
        slot.enabled = enabled;
        true
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            retrieval_mode: RetrievalMode::default(),
            orientation: default_orientation(),
            constraints: default_constraints(),
            memory: default_memory_layer(),
            guide: default_guide(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Extract anti-patterns from trajectories judged as failures
    #[serde(default = "default_true")]
    pub learn_from_failures: bool,

    /// Smallest batch a consolidation pass accepts
    #[serde(default = "default_min_batch")]
    pub min_batch: usize,

    /// Run consolidation after this many learned trajectories (0 = never)
    #[serde(default)]
    pub consolidate_every: usize,

    /// Judgments below this confidence are treated as indeterminate
    #[serde(default)]
    pub min_confidence: f32,
}

fn default_min_batch() -> usize {
    2
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learn_from_failures: true,
            min_batch: default_min_batch(),
            consolidate_every: 0,
            min_confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Ceiling on sub-model calls per rollout
    #[serde(default = "default_max_subcalls")]
    pub max_subcalls: u64,

    /// Concurrent sub-model calls
    #[serde(default = "default_subcall_workers")]
    pub subcall_workers: usize,

    /// Concurrent rollouts in a batch
    #[serde(default = "default_rollout_workers")]
    pub rollout_workers: usize,

    #[serde(default = "default_rollouts_per_task")]
    pub rollouts_per_task: usize,
}

fn default_max_iterations() -> u32 {
    16
}
fn default_max_subcalls() -> u64 {
    50
}
fn default_subcall_workers() -> usize {
    4
}
fn default_rollout_workers() -> usize {
    4
}
fn default_rollouts_per_task() -> usize {
    1
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_subcalls: default_max_subcalls(),
            subcall_workers: default_subcall_workers(),
            rollout_workers: default_rollout_workers(),
            rollouts_per_task: default_rollouts_per_task(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Also checks environment variables:
    /// - `PROCMEM_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `PROCMEM_API_URL`, `PROCMEM_MODEL`, `PROCMEM_MEMORY_PATH`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&Self::config_path())
    }

    /// Load from `path` and apply the same environment overrides as `load`.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = std::env::var("PROCMEM_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }
        if let Ok(url) = std::env::var("PROCMEM_API_URL") {
            self.provider.api_url = url;
        }
        if let Ok(model) = std::env::var("PROCMEM_MODEL") {
            self.provider.model = model;
        }
        if let Ok(path) = std::env::var("PROCMEM_MEMORY_PATH") {
            self.memory.path = Some(PathBuf::from(path));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".procmem")
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// The memory file, explicit or default.
    pub fn memory_path(&self) -> PathBuf {
        self.memory
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("memory.jsonl"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, t) in [
            ("provider.judge_temperature", self.provider.judge_temperature),
            ("provider.extract_temperature", self.provider.extract_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0.0 and 2.0"
                )));
            }
        }

        if self.memory.search_k == 0 {
            return Err(ConfigError::ValidationError("memory.search_k must be >= 1".into()));
        }
        if self.memory.max_get == 0 {
            return Err(ConfigError::ValidationError("memory.max_get must be >= 1".into()));
        }
        if self.runtime.subcall_workers == 0 || self.runtime.rollout_workers == 0 {
            return Err(ConfigError::ValidationError(
                "runtime worker counts must be >= 1".into(),
            ));
        }
        if self.runtime.rollouts_per_task == 0 {
            return Err(ConfigError::ValidationError(
                "runtime.rollouts_per_task must be >= 1".into(),
            ));
        }
        if self.learning.min_batch < 2 {
            return Err(ConfigError::ValidationError(
                "learning.min_batch must be >= 2; consolidation never runs on single trajectories"
                    .into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.learning.min_confidence) {
            return Err(ConfigError::ValidationError(
                "learning.min_confidence must be between 0.0 and 1.0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory.max_get, 3);
        assert_eq!(config.context.retrieval_mode, RetrievalMode::AutoInject);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider.model, config.provider.model);
        assert_eq!(parsed.context, config.context);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.provider.judge_temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn single_trajectory_batches_rejected() {
        let mut config = AppConfig::default();
        config.learning.min_batch = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.memory.search_k, 5);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            r#"
[context]
retrieval_mode = "tool_mediated"

[context.guide]
enabled = false
budget = 500

[memory]
max_get = 2
"#
        )
        .unwrap();
        let config = AppConfig::load_from(tmp.path()).unwrap();
        assert!(!config.context.guide.enabled);
        assert_eq!(config.context.retrieval_mode, RetrievalMode::ToolMediated);
        assert_eq!(config.memory.max_get, 2);
        assert!(config.context.orientation.enabled);
    }

    #[test]
    fn total_budget_counts_enabled_layers_only() {
        let mut ctx = ContextConfig::default();
        let all = ctx.total_budget();
        assert!(ctx.set_enabled("guide", false));
        assert_eq!(ctx.total_budget(), all - ctx.guide.budget);
        assert!(!ctx.set_enabled("nope", false));
    }

    #[test]
    fn debug_redacts_api_key() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("REDACTED"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("[context.memory]"));
    }
}
