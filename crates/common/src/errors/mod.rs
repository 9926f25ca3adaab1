//! Error types for the Recall engine
//!
//! Provides one error enum shared across the workspace with:
//! - Distinct variants for each failure mode
//! - A retryability hint for transport-level faults
//! - Conversions from the underlying client libraries

use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error types
#[derive(Error, Debug)]
pub enum EngineError {
    /// Vector store unreachable after exhausting connect retries
    #[error("Vector store unreachable after {attempts} attempts: {message}")]
    Connectivity { attempts: u32, message: String },

    /// A batch upsert failed after exhausting retries. The batch must be
    /// assumed not durably stored; earlier batches may have been written.
    #[error("Batch write failed after {attempts} attempts: {message}")]
    Write { attempts: u32, message: String },

    /// Embedding or rerank inference failure
    #[error("Embedding service error: {message}")]
    Embedding { message: String },

    /// Input-contract violation; raised immediately, never retried
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Vector store returned an error for a single call
    #[error("Vector store error: {message}")]
    Store { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Shorthand for input-contract violations
    pub fn invalid_input(message: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            message: message.into(),
        }
    }

    /// Shorthand for store-level faults
    pub fn store(message: impl Into<String>) -> Self {
        EngineError::Store {
            message: message.into(),
        }
    }

    /// Shorthand for inference faults
    pub fn embedding(message: impl Into<String>) -> Self {
        EngineError::Embedding {
            message: message.into(),
        }
    }

    /// Whether a caller-side retry of the whole operation can help.
    ///
    /// Connect and write failures have already been retried with backoff
    /// internally, but remain transient from the caller's perspective.
    /// Input and configuration errors will fail identically on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Connectivity { .. }
                | EngineError::Write { .. }
                | EngineError::Store { .. }
                | EngineError::Embedding { .. }
                | EngineError::HttpClient(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let err = EngineError::Connectivity {
            attempts: 5,
            message: "refused".to_string(),
        };
        assert!(err.is_transient());

        let err = EngineError::invalid_input("empty chunk list");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_display_includes_attempts() {
        let err = EngineError::Write {
            attempts: 3,
            message: "timeout".to_string(),
        };
        assert!(err.to_string().contains("3 attempts"));
    }
}
