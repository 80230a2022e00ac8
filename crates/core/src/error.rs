//! Error types for the procmem domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; `Error` rolls them up.
//!
//! Empty states are not errors: an empty search result, an extractor that
//! produced nothing, and an indeterminate judgment are all ordinary values.

use thiserror::Error;

/// The top-level error type for all procmem operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Blob error: {0}")]
    Blob(#[from] BlobError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Learning error: {0}")]
    Learning(#[from] LearningError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlobError {
    #[error("No blob stored under key '{0}'")]
    NotFound(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("Memory item not found: {0}")]
    NotFound(String),

    #[error("Requested {requested} items but at most {max_n} may be fetched; choose fewer ids")]
    BudgetExceeded { requested: usize, max_n: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum QueryError {
    #[error("Query execution failed: {0}")]
    Execution(String),
}

#[derive(Debug, Clone, Error)]
pub enum LearningError {
    #[error("Judge failed: {0}")]
    Judge(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Consolidation failed: {0}")]
    Consolidation(String),

    #[error("Sub-call budget exhausted: {used} of {limit} calls used")]
    BudgetExceeded { used: u64, limit: u64 },

    #[error("Sub-call failed: {0}")]
    SubCall(String),

    #[error("Agent run failed: {0}")]
    Runtime(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}
