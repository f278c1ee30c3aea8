//! Error types for the conversation engine.

use thiserror::Error;

use crate::controller::ConversationPhase;
use crate::sdk::SdkError;

/// Errors reported by the public operations of the conversation engine.
///
/// Classification never produces an error: unknown entry shapes degrade to a
/// fallback render variant instead.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Network/backend failure. Retryable by re-invoking the same operation.
    #[error("Transport error during {operation}: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// The caller supplied invalid input (e.g. blank message text).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation is not valid in the current lifecycle phase.
    #[error("Cannot {operation} while {phase}")]
    State {
        operation: &'static str,
        phase: ConversationPhase,
    },
}

impl ClientError {
    /// Creates a Transport error
    pub fn transport(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Transport {
            operation,
            message: message.into(),
        }
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a State error
    pub fn state(operation: &'static str, phase: ConversationPhase) -> Self {
        Self::State { operation, phase }
    }

    /// Whether re-invoking the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_state(&self) -> bool {
        matches!(self, Self::State { .. })
    }

    /// Wraps an SDK failure as a transport error for the named operation.
    pub fn from_sdk(operation: &'static str, err: SdkError) -> Self {
        Self::transport(operation, err.to_string())
    }
}

/// A type alias for `Result<T, ClientError>`.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        let err = ClientError::transport("fetch", "connection reset");
        assert!(err.is_retryable());
        assert!(!err.is_validation());

        let err = ClientError::validation("Message cannot be empty");
        assert!(err.is_validation());
        assert!(!err.is_retryable());

        let err = ClientError::state("retrieve transcript", ConversationPhase::Idle);
        assert!(err.is_state());
        assert_eq!(err.to_string(), "Cannot retrieve transcript while idle");
    }

    #[test]
    fn test_from_sdk_keeps_message() {
        let err = ClientError::from_sdk("send", SdkError::Unavailable("offline".into()));
        assert_eq!(
            err,
            ClientError::Transport {
                operation: "send",
                message: "Backend unavailable: offline".into(),
            }
        );
    }
}
