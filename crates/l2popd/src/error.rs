//! Error types for l2popd
//!
//! Unresolvable topology (no agent, no tunnel endpoint, unsupported tunnel
//! type) is not represented here: it is a skip condition reported through
//! [`crate::fdb::Unresolved`] and never fails an event.

use thiserror::Error;

/// Errors surfaced by the l2popd service and its configuration layer.
#[derive(Debug, Error)]
pub enum L2PopError {
    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to encode or decode JSON (events, notification payloads)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A lifecycle event referenced a port the topology does not know
    #[error("Unknown port: {0}")]
    UnknownPort(String),

    /// The notification channel's receiving side has gone away
    #[error("Dispatcher channel closed")]
    DispatcherClosed,

    /// Delivery failure reported by a transport
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias for l2popd operations
pub type Result<T> = std::result::Result<T, L2PopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = L2PopError::UnknownPort("p1".to_string());
        assert_eq!(err.to_string(), "Unknown port: p1");

        let err = L2PopError::Config("agent_boot_time_secs must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: agent_boot_time_secs must be > 0"
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: L2PopError = parse.unwrap_err().into();
        assert!(matches!(err, L2PopError::Json(_)));
    }
}
