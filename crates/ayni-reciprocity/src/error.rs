//! Error types for the reciprocity model.
//!
//! Scoring and consensus are pure functions over validated data, so every
//! variant here means "input invalid" rather than "something unreachable".

use thiserror::Error;

/// Errors raised while building or scoring neutrosophic data.
#[derive(Debug, Error, PartialEq)]
pub enum ReciprocityError {
    /// A T/I/F component fell outside [0, 1] (or was not finite).
    #[error("{component} must be within [0, 1], got {value}")]
    OutOfRange {
        /// Component name ("truth", "indeterminacy", "falsehood").
        component: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// The prompt has no layer carrying an evaluation.
    #[error("prompt has no evaluated layers")]
    NoEvaluations,

    /// The consensus measure was asked to aggregate nothing.
    #[error("consensus requires at least one observation")]
    EmptyObservations,

    /// A configured threshold is unusable.
    #[error("invalid threshold {name}: {value}")]
    InvalidThreshold {
        /// Threshold name.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },
}
