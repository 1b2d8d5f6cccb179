//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The controller sent an empty line
    #[error("Empty reply from controller")]
    EmptyReply,

    /// The reply line was not a recognised JSON reply
    #[error("Malformed reply: {0}")]
    MalformedReply(#[from] serde_json::Error),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::EmptyReply;
        assert_eq!(err.to_string(), "Empty reply from controller");

        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ProtocolError::from(json_err);
        assert!(err.to_string().starts_with("Malformed reply"));
    }
}
