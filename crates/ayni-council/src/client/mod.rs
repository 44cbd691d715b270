//! Inference client seam.
//!
//! The Fire Circle never talks to a model directly. Retries, backoff,
//! authentication and cost accounting belong to the implementation of
//! [`InferenceClient`]; the circle only sees a reply or an error.

mod replay;

use async_trait::async_trait;

use crate::error::InferenceError;
use crate::judgment::ModelReply;

pub use replay::{RecordedCall, ReplayClient, ReplayOutcome, ReplayScript, ReplayStep};

/// Asks one participant model for a judgment.
///
/// Implementations must be safe to call concurrently for different
/// participants. The circle wraps every call in its own timeout, so an
/// implementation may block for as long as its own policy allows.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Evaluates `prompt_text` as `participant` for the given round.
    ///
    /// # Errors
    ///
    /// Any [`InferenceError`]; the circle records it as a participant
    /// failure.
    async fn evaluate(
        &self,
        participant: &str,
        prompt_text: &str,
        round: usize,
    ) -> Result<ModelReply, InferenceError>;
}
