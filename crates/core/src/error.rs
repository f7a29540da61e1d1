//! Error types for the crc-sim system.
//!
//! Codec and injector operations return structured errors rather than
//! panicking. The transmission simulator folds recoverable errors into its
//! outcome record, so only the diagnostics and the relay surface them directly.

use thiserror::Error;

/// Top-level error type for all operations in the system.
///
/// Each variant corresponds to a specific failure domain:
/// - Invalid input: malformed bit strings, short keys, impossible flip counts
/// - Invariant violation: a generator key that misses single-bit errors
/// - Relay: messages that cannot be routed
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed bit string or key, or a flip/burst count the source cannot hold.
    ///
    /// Recoverable; callers surface it as a rejected request.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The single-bit self-check found flips that still verify.
    ///
    /// Not a runtime condition: the generator key does not provide the
    /// detection guarantee and must be replaced.
    #[error("key {key} misses single-bit errors at positions {positions:?}")]
    UndetectedErrorInvariantViolation { key: String, positions: Vec<usize> },

    /// Relay routing error
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),
}

impl Error {
    /// Build an `InvalidInput` from anything printable.
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Error::InvalidInput(reason.into())
    }

    /// Whether the caller may recover by fixing its request.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::UndetectedErrorInvariantViolation { .. })
    }
}

/// Relay routing errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    /// A node message carried no target
    #[error("no target specified")]
    NoTarget,

    /// A master message carried no command
    #[error("no command specified")]
    NoCommand,
}

/// Type alias for Result with our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_violation_is_fatal() {
        let err = Error::UndetectedErrorInvariantViolation {
            key: "10010".to_string(),
            positions: vec![3],
        };
        assert!(!err.is_recoverable());
        assert!(Error::invalid("empty").is_recoverable());
    }

    #[test]
    fn test_display() {
        let err = Error::invalid("bit string is empty");
        assert_eq!(err.to_string(), "invalid input: bit string is empty");

        let err: Error = RelayError::NoTarget.into();
        assert_eq!(err.to_string(), "relay error: no target specified");
    }
}
