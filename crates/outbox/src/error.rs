//! Error types for the outbox crate
//!
//! Storage and plumbing code returns `anyhow::Result`; the types here cover
//! the failures callers are expected to match on.

use std::time::Duration;

/// Errors surfaced to callers of the engine
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("Entity kind must not be empty")]
    InvalidEntityKind,

    #[error("Invalid engine configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Unknown operation kind: {0}")]
    InvalidOperation(String),

    #[error("Payload is not serializable: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored queue is corrupt: {message}")]
    CorruptQueue { message: String },

    #[error("Stored queue uses schema version {found}, this build supports up to {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("Failed to start background thread: {0}")]
    Thread(#[source] std::io::Error),
}

/// Why a single dispatch attempt failed
///
/// Every variant is transient from the engine's point of view: the item is
/// marked failed and retried on a later pass while under the retry cap.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("Remote rejected mutation (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Dispatch timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Dispatcher panicked")]
    Panicked,

    #[error("{message}")]
    Other { message: String },
}

impl DispatchError {
    /// Shorthand for a free-form failure
    pub fn other(message: impl Into<String>) -> Self {
        DispatchError::Other {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_error_messages() {
        let err = DispatchError::Rejected {
            status: 409,
            message: "conflict".to_string(),
        };
        assert_eq!(err.to_string(), "Remote rejected mutation (HTTP 409): conflict");

        let err = DispatchError::Timeout {
            after: Duration::from_secs(30),
        };
        assert_eq!(err.to_string(), "Dispatch timed out after 30s");

        assert_eq!(DispatchError::other("offline").to_string(), "offline");
    }

    #[test]
    fn test_schema_error_message() {
        let err = OutboxError::UnsupportedSchema {
            found: 7,
            supported: 1,
        };
        assert!(err.to_string().contains("version 7"));
    }

    #[test]
    fn test_config_error_message() {
        let err = OutboxError::InvalidConfig {
            message: "max_retries must be at least 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid engine configuration: max_retries must be at least 1"
        );
    }
}
