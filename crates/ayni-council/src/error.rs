//! Error types for the Fire Circle.
//!
//! Participant failures (`Api`, `Parse`, `Timeout`) are recoverable in
//! resilient mode and recorded on the result. `Quorum` and `ProtocolAbort`
//! always end the dialogue without a result.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for council operations.
pub type Result<T> = std::result::Result<T, CouncilError>;

/// Why a single participant call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport, authentication or rate limiting in the inference client.
    Api,
    /// The reply could not be read as a judgment.
    Parse,
    /// No reply within the per-call timeout.
    Timeout,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Api => "api",
            FailureKind::Parse => "parse",
            FailureKind::Timeout => "timeout",
        };
        f.write_str(name)
    }
}

/// Error reported by an [`InferenceClient`](crate::InferenceClient).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InferenceError {
    /// The model could not be reached or refused the call.
    #[error("api failure: {0}")]
    Api(String),

    /// The model answered with something that is not a judgment.
    #[error("malformed reply: {0}")]
    Malformed(String),

    /// The client gave up waiting on its own.
    #[error("client timeout: {0}")]
    Timeout(String),
}

impl InferenceError {
    /// Failure classification used by the dialogue policy.
    pub fn kind(&self) -> FailureKind {
        match self {
            InferenceError::Api(_) => FailureKind::Api,
            InferenceError::Malformed(_) => FailureKind::Parse,
            InferenceError::Timeout(_) => FailureKind::Timeout,
        }
    }
}

/// Errors that end a Fire Circle dialogue.
#[derive(Debug, Error)]
pub enum CouncilError {
    /// Strict mode: one participant failed, so the whole dialogue is void.
    #[error("dialogue aborted: participant '{participant}' failed in round {round} ({kind}): {message}")]
    ProtocolAbort {
        /// Failing participant.
        participant: String,
        /// Round of the failure.
        round: usize,
        /// Failure classification.
        kind: FailureKind,
        /// Failure detail.
        message: String,
    },

    /// Active participants fell below the minimum viable circle.
    #[error("quorum lost in round {round}: {active} active participants, minimum required is {required}")]
    Quorum {
        /// Participants still active.
        active: usize,
        /// Minimum viable circle size.
        required: usize,
        /// Round in which quorum was lost (0 before the first round).
        round: usize,
    },

    /// The configuration or participant list is unusable.
    #[error("invalid fire circle config: {0}")]
    InvalidConfig(String),

    /// A template key did not name a known evaluation template.
    #[error("unknown evaluation template: '{0}'")]
    UnknownTemplate(String),

    /// A replay script could not be loaded.
    #[error("invalid replay script: {0}")]
    InvalidScript(String),

    /// An evaluation task ended without reporting an outcome.
    #[error("internal council error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_display_names_minimum() {
        let err = CouncilError::Quorum {
            active: 1,
            required: 2,
            round: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("1 active"));
        assert!(msg.contains("minimum required is 2"));
        assert!(msg.contains("round 3"));
    }

    #[test]
    fn test_protocol_abort_display() {
        let err = CouncilError::ProtocolAbort {
            participant: "model-b".to_string(),
            round: 2,
            kind: FailureKind::Timeout,
            message: "no response".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("model-b"));
        assert!(msg.contains("round 2"));
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn test_inference_error_kind() {
        assert_eq!(InferenceError::Api("503".into()).kind(), FailureKind::Api);
        assert_eq!(
            InferenceError::Malformed("html".into()).kind(),
            FailureKind::Parse
        );
        assert_eq!(
            InferenceError::Timeout("30s".into()).kind(),
            FailureKind::Timeout
        );
    }

    #[test]
    fn test_unknown_template_display() {
        let err = CouncilError::UnknownTemplate("poetry".to_string());
        assert!(err.to_string().contains("poetry"));
    }
}
