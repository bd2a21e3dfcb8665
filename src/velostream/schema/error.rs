//! Schema Error Types
//!
//! Errors raised while talking to a schema catalog. Registry failures never cross
//! the codec boundary directly: the client absorbs them into back-off state and
//! events, and callers only observe a missing schema.

/// Error types for schema catalog operations
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// The request never produced a response
    #[error("Schema registry request to '{path}' failed: {message}")]
    Transport {
        path: String,
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The registry answered with anything other than 200
    #[error("Schema registry returned status {status} for '{path}'")]
    Status { path: String, status: u16 },

    /// The request exceeded the configured fetch timeout
    #[error("Schema registry request to '{path}' timed out after {timeout_ms} ms")]
    Timeout { path: String, timeout_ms: u64 },

    /// The response body could not be interpreted
    #[error("Malformed schema registry response for '{path}': {message}")]
    InvalidResponse {
        path: String,
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// The catalog cannot be built from its configuration
    #[error("Invalid catalog configuration: {message}")]
    Configuration { message: String },
}

pub type SchemaResult<T> = Result<T, SchemaError>;
