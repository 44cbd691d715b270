//! Deterministic client driven by a recorded script.
//!
//! Each participant has an ordered list of steps. Every call consumes the
//! next step for that participant, so one script can span several
//! dialogues as long as the call order per participant is known.
//!
//! ```json
//! {
//!   "model-a": [
//!     { "judgment": { "truth": 0.8, "indeterminacy": 0.1, "falsehood": 0.1, "reasoning": "fine" } },
//!     { "text": "truth: 0.7\nindeterminacy: 0.2\nfalsehood: 0.2" },
//!     { "error": "rate limited", "delay_ms": 50 }
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::InferenceClient;
use crate::error::{CouncilError, InferenceError};
use crate::judgment::{Judgment, ModelReply};

/// What a scripted call returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayOutcome {
    /// A structured judgment.
    Judgment(Judgment),
    /// Raw text for the parser.
    Text(String),
    /// An API failure with this message.
    Error(String),
}

/// One scripted reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayStep {
    /// Delay before replying, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
    /// The reply.
    #[serde(flatten)]
    pub outcome: ReplayOutcome,
}

impl ReplayStep {
    /// Replies with a structured judgment.
    pub fn judgment(judgment: Judgment) -> Self {
        Self {
            delay_ms: 0,
            outcome: ReplayOutcome::Judgment(judgment),
        }
    }

    /// Replies with raw text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            outcome: ReplayOutcome::Text(text.into()),
        }
    }

    /// Fails with an API error.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            delay_ms: 0,
            outcome: ReplayOutcome::Error(message.into()),
        }
    }

    /// Waits before replying.
    #[must_use]
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }
}

/// Steps per participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplayScript {
    /// Participant id to ordered steps.
    pub participants: BTreeMap<String, Vec<ReplayStep>>,
}

/// A call the replay client received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Participant id.
    pub participant: String,
    /// Round number.
    pub round: usize,
    /// Text the participant was sent.
    pub prompt_text: String,
}

/// [`InferenceClient`] that replays a [`ReplayScript`].
///
/// # Example
///
/// ```rust
/// use ayni_council::{Judgment, ReplayClient, ReplayStep};
/// use ayni_reciprocity::Tif;
///
/// let client = ReplayClient::new()
///     .with_step("model-a", ReplayStep::judgment(Judgment::new(Tif::new(0.8, 0.1, 0.1)?, "ok")))
///     .with_step("model-a", ReplayStep::error("rate limited"));
/// # Ok::<(), ayni_reciprocity::ReciprocityError>(())
/// ```
#[derive(Debug, Default)]
pub struct ReplayClient {
    script: ReplayScript,
    cursors: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ReplayClient {
    /// Creates a client with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client from a script.
    pub fn from_script(script: ReplayScript) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Parses a JSON script.
    ///
    /// # Errors
    ///
    /// [`CouncilError::InvalidScript`] if the JSON does not describe a script.
    pub fn from_json(json: &str) -> Result<Self, CouncilError> {
        let script: ReplayScript =
            serde_json::from_str(json).map_err(|e| CouncilError::InvalidScript(e.to_string()))?;
        Ok(Self::from_script(script))
    }

    /// Reads a JSON script from disk.
    ///
    /// # Errors
    ///
    /// [`CouncilError::InvalidScript`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CouncilError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| CouncilError::InvalidScript(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Appends a step for a participant.
    #[must_use]
    pub fn with_step(mut self, participant: impl Into<String>, step: ReplayStep) -> Self {
        self.script
            .participants
            .entry(participant.into())
            .or_default()
            .push(step);
        self
    }

    /// Appends several steps for a participant.
    #[must_use]
    pub fn with_steps<I>(mut self, participant: impl Into<String>, steps: I) -> Self
    where
        I: IntoIterator<Item = ReplayStep>,
    {
        self.script
            .participants
            .entry(participant.into())
            .or_default()
            .extend(steps);
        self
    }

    /// Scripted participant ids, sorted.
    pub fn participants(&self) -> Vec<String> {
        self.script.participants.keys().cloned().collect()
    }

    /// Every call received so far, in arrival order.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    async fn next_step(&self, participant: &str) -> Result<ReplayStep, InferenceError> {
        let steps = self
            .script
            .participants
            .get(participant)
            .ok_or_else(|| InferenceError::Api(format!("no script for '{}'", participant)))?;

        let mut cursors = self.cursors.lock().await;
        let cursor = cursors.entry(participant.to_string()).or_insert(0);
        let step = steps.get(*cursor).cloned().ok_or_else(|| {
            InferenceError::Api(format!(
                "script for '{}' exhausted after {} replies",
                participant,
                steps.len()
            ))
        })?;
        *cursor += 1;
        Ok(step)
    }
}

#[async_trait]
impl InferenceClient for ReplayClient {
    async fn evaluate(
        &self,
        participant: &str,
        prompt_text: &str,
        round: usize,
    ) -> Result<ModelReply, InferenceError> {
        self.calls.lock().await.push(RecordedCall {
            participant: participant.to_string(),
            round,
            prompt_text: prompt_text.to_string(),
        });

        let step = self.next_step(participant).await?;
        debug!(participant, round, delay_ms = step.delay_ms, "replaying scripted reply");
        if step.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        }

        match step.outcome {
            ReplayOutcome::Judgment(judgment) => Ok(ModelReply::Judgment(judgment)),
            ReplayOutcome::Text(text) => Ok(ModelReply::Text(text)),
            ReplayOutcome::Error(message) => Err(InferenceError::Api(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ayni_reciprocity::Tif;

    fn judgment(f: f64) -> Judgment {
        Judgment::new(Tif::new(0.5, 0.2, f).unwrap(), "scripted")
    }

    #[tokio::test]
    async fn test_steps_consumed_in_order() {
        let client = ReplayClient::new()
            .with_step("a", ReplayStep::judgment(judgment(0.1)))
            .with_step("a", ReplayStep::error("boom"));

        let first = client.evaluate("a", "p", 1).await.unwrap();
        assert_eq!(first, ModelReply::Judgment(judgment(0.1)));

        let second = client.evaluate("a", "p", 2).await.unwrap_err();
        assert_eq!(second, InferenceError::Api("boom".to_string()));

        let third = client.evaluate("a", "p", 3).await.unwrap_err();
        assert!(third.to_string().contains("exhausted"));
    }

    #[tokio::test]
    async fn test_unknown_participant_is_api_failure() {
        let client = ReplayClient::new();
        let err = client.evaluate("ghost", "p", 1).await.unwrap_err();
        assert!(matches!(err, InferenceError::Api(_)));
    }

    #[tokio::test]
    async fn test_calls_are_recorded() {
        let client = ReplayClient::new().with_step("a", ReplayStep::text("truth: 1"));
        let _ = client.evaluate("a", "hello", 1).await;
        let calls = client.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].prompt_text, "hello");
    }

    #[test]
    fn test_script_from_json() {
        let json = r#"{
            "model-a": [
                { "judgment": { "truth": 0.8, "indeterminacy": 0.1, "falsehood": 0.1, "reasoning": "fine" } },
                { "text": "truth: 0.7 indeterminacy: 0.2 falsehood: 0.2", "delay_ms": 5 },
                { "error": "rate limited" }
            ]
        }"#;
        let client = ReplayClient::from_json(json).unwrap();
        let steps = &client.script.participants["model-a"];
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[1].delay_ms, 5);
        assert!(matches!(steps[2].outcome, ReplayOutcome::Error(_)));
    }

    #[test]
    fn test_invalid_script_rejected() {
        let err = ReplayClient::from_json(r#"{"model-a": [{"judgment": {"truth": 2.0}}]}"#)
            .unwrap_err();
        assert!(matches!(err, CouncilError::InvalidScript(_)));
    }
}
