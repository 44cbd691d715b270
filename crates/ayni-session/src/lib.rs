//! # Ayni Session
//!
//! Trust trajectory across the exchanges of one caller session.
//!
//! A single prompt is scored in isolation by `ayni-reciprocity`. This crate
//! looks at the sequence: a trust EMA, per-violation circuit breakers, a
//! bounded balance history and refusal counters, from which it derives a
//! [`Trajectory`] and an advisory [`Recommendation`].
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`SessionAccumulator`] | Mutable per-session state |
//! | [`SessionConfig`] | Windows and thresholds |
//! | [`InteractionObservation`] | One exchange, usually built from metrics |
//! | [`Recommendation`] | Trust level and engagement mode |
//!
//! ## Quick Start
//!
//! ```rust
//! use ayni_reciprocity::{LayerPriority, MultiNeutrosophicPrompt, ReciprocityScorer, SourceType, Tif};
//! use ayni_session::{InteractionObservation, SessionAccumulator};
//!
//! let mut prompt = MultiNeutrosophicPrompt::new();
//! prompt
//!     .add_layer("What is the capital of Peru?", LayerPriority::User)
//!     .add_evaluation(Tif::new(0.9, 0.2, 0.0).unwrap(), SourceType::Semantic);
//! let metrics = ReciprocityScorer::new().score(&prompt).unwrap();
//!
//! let mut session = SessionAccumulator::new();
//! session.accumulate(InteractionObservation::from_metrics(&metrics))?;
//! assert_eq!(session.interactions(), 1);
//! # Ok::<(), ayni_session::SessionError>(())
//! ```
//!
//! ## Security Notes
//!
//! - Session state is an explicit object owned by the caller, never global
//! - Recommendations are advisory; enforcement belongs to the caller

mod accumulator;
mod error;
mod recommendation;

pub use accumulator::{InteractionObservation, SessionAccumulator, SessionConfig, SessionSummary};
pub use error::{Result, SessionError};
pub use recommendation::{BoundarySignal, EngagementMode, Recommendation, Trajectory, TrustLevel};
