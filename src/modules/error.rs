//! Error taxonomy for the client core.
//!
//! Dispatch-path failures (undecodable payloads, unknown message types) are
//! contained and logged where they occur; the variants here surface only
//! through the blocking entry points (`mount`, request waits, session
//! creation).

use thiserror::Error;

/// Errors surfaced by session creation, the mount handshake, and request
/// waits.
#[derive(Debug, Error)]
pub enum ClientError {
    /// An allocation or resource acquisition failed. Fatal to the operation,
    /// not to the process.
    #[error("out of resources: {0}")]
    ResourceExhausted(&'static str),

    /// A bounded wait expired without the cluster answering. The whole
    /// operation may be retried by the caller.
    #[error("timed out waiting for the cluster")]
    Timeout,

    /// An external interrupt arrived during a wait. Distinct from
    /// [`ClientError::Timeout`]: no retry budget was consumed.
    #[error("operation cancelled")]
    Cancelled,

    /// A remote party violated a protocol invariant. Not recoverable locally.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// The remote explicitly reported failure with the given result code.
    #[error("remote rejected request with code {0}")]
    RemoteRejected(i32),

    /// A received payload failed to parse.
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The transport refused or failed to carry a message.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The caller-supplied arguments cannot describe a mount.
    #[error("invalid mount arguments: {0}")]
    InvalidArgs(&'static str),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_rejected_carries_code() {
        let err = ClientError::RemoteRejected(5);
        assert_eq!(err.to_string(), "remote rejected request with code 5");
    }

    #[test]
    fn test_decode_error_from_serde() {
        let bad: std::result::Result<u32, _> = serde_json::from_slice(b"not json");
        let err: ClientError = bad.unwrap_err().into();
        assert!(matches!(err, ClientError::Decode(_)));
    }
}
