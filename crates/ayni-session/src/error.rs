//! Error types for session accumulation.

use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors raised by the session accumulator.
///
/// An invalid observation is rejected before any state is touched, so a
/// failed `accumulate` call leaves the session exactly as it was.
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    /// An observation field was outside its valid range.
    #[error("invalid observation: {field} = {value}")]
    InvalidObservation {
        /// Field name.
        field: &'static str,
        /// Rejected value.
        value: f64,
    },

    /// A configuration parameter is unusable.
    #[error("invalid session config: {0}")]
    InvalidConfig(String),
}
