//! # Ayni Council
//!
//! The Fire Circle: a multi-round consensus dialogue among independent
//! evaluator models, tolerant of participant failure.
//!
//! ## Overview
//!
//! A single model judging a prompt is a single point of failure: it can be
//! manipulated by the very prompt it evaluates. The Fire Circle asks
//! several models, lets them see each other's reasoning across rounds and
//! rotates an "empty chair" that speaks for stakeholders who are not in the
//! room. The circle reports the most severe judgment any active participant
//! gave, along with the patterns a majority of them recognised.
//!
//! ## Threat Model
//!
//! ### Single Model Compromise
//! A participant fooled by the prompt reports low falsehood. Because the
//! consensus falsehood is the maximum over every active participant in
//! every round, one clear-sighted participant is enough.
//!
//! ### Unreliable Participants
//! Models time out, hit rate limits or answer in prose. A failed call is a
//! recorded failure, never a fabricated neutral judgment. Resilient mode
//! continues while a minimum viable circle remains; strict mode refuses to
//! report anything once a single call fails.
//!
//! ### Groupthink
//! Dialogue rounds show each participant the previous round, which can pull
//! judgments together. The empty chair rotates each round so that a
//! different participant is asked to argue from outside the circle.
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`FireCircle`] | Dialogue orchestrator |
//! | [`InferenceClient`] | Seam to the model-inference layer |
//! | [`ReplayClient`] | Scripted client for replays and tests |
//! | [`ResponseParser`] | JSON / field / keyword reply parsing |
//! | [`EvaluationTemplate`] | Closed set of evaluation prompts |
//! | [`PatternTracker`] | Pattern attribution and agreement |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ayni_council::{FireCircle, FireCircleConfig, FailureMode};
//!
//! let circle = FireCircle::new(
//!     Arc::new(my_client),
//!     FireCircleConfig::new().with_failure_mode(FailureMode::Resilient),
//! )?;
//! let result = circle.run_prompt(&prompt, &["model-a", "model-b", "model-c"]).await?;
//!
//! if result.partial {
//!     // at least one participant failed; see result.failures
//! }
//! ```

mod circle;
mod client;
mod error;
mod judgment;
mod pattern;
mod template;

pub use circle::{
    ConsensusJudgment, DialogueRound, FailureMode, FireCircle, FireCircleConfig,
    FireCircleResult, ParticipantEvaluation, ParticipantFailure, ParticipantStatus, RoundMetrics,
};
pub use client::{
    InferenceClient, RecordedCall, ReplayClient, ReplayOutcome, ReplayScript, ReplayStep,
};
pub use error::{CouncilError, FailureKind, InferenceError, Result};
pub use judgment::{Judgment, ModelReply, ResponseParser};
pub use pattern::{normalize_tag, Pattern, PatternTracker};
pub use template::EvaluationTemplate;
