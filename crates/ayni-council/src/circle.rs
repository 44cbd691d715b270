//! # Fire Circle
//!
//! Multi-round consensus dialogue among independent evaluator models.
//!
//! ## Protocol
//!
//! ```text
//! round 1   every participant judges alone          (no empty chair)
//! round r   participants see round r-1, one holds   participants[(r-1) mod n]
//!           the empty chair and speaks for the
//!           absent
//! result    F = max F of active participants over every round
//! ```
//!
//! ## Failure Handling
//!
//! | Mode | Participant failure | Result |
//! |------|---------------------|--------|
//! | Strict | abort the dialogue | [`CouncilError::ProtocolAbort`] |
//! | Resilient, round 1 | participant excluded | continues if quorum holds |
//! | Resilient, round > 1 | participant becomes a zombie | continues if quorum holds |
//!
//! A zombie keeps its earlier rounds in the history for audit but takes no
//! further part: it is not asked again and its judgments do not reach the
//! consensus. Pattern agreement is measured against the circle as it stood
//! when the pattern was first reported, so a later failure removes the
//! participant's vote without shrinking the denominator.
//!
//! ## Concurrency
//!
//! Calls within a round run concurrently on a [`JoinSet`], each under its
//! own timeout. The round is a barrier: every outcome is collected before
//! participant state changes. A strict abort drops the set, which cancels
//! the calls still in flight, so no late reply is ever attributed.
//!
//! ## Security Notes
//!
//! - The worst judgment anywhere in the dialogue wins; agreement cannot
//!   outvote a participant that saw an attack
//! - A failed participant is never replaced by an invented neutral judgment
//! - Quorum loss is an error, never a silently degraded result

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ayni_reciprocity::{MultiNeutrosophicPrompt, Tif};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::InferenceClient;
use crate::error::{CouncilError, FailureKind, Result};
use crate::judgment::{Judgment, ResponseParser};
use crate::pattern::{Pattern, PatternTracker};
use crate::template::EvaluationTemplate;

/// What to do when a participant fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Any failure aborts the dialogue.
    Strict,
    /// Failures are recorded while quorum holds.
    #[default]
    Resilient,
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureMode::Strict => f.write_str("strict"),
            FailureMode::Resilient => f.write_str("resilient"),
        }
    }
}

/// Configuration for [`FireCircle`].
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use ayni_council::{FailureMode, FireCircleConfig};
///
/// let config = FireCircleConfig::new()
///     .with_max_rounds(4)
///     .with_failure_mode(FailureMode::Strict)
///     .with_per_call_timeout(Duration::from_secs(20));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FireCircleConfig {
    /// Rounds to run (at least 1).
    pub max_rounds: usize,
    /// Failure policy.
    pub failure_mode: FailureMode,
    /// Smallest circle that may continue.
    pub min_viable_participants: usize,
    /// Agreement a pattern needs to be retained, in [0, 1].
    pub pattern_agreement_threshold: f64,
    /// Timeout applied to each participant call.
    pub per_call_timeout: Duration,
    /// Stop after a round (from round 2) whose falsehood stddev is below this.
    pub early_stop_stddev: Option<f64>,
    /// Template for the independent first round.
    pub baseline_template: EvaluationTemplate,
}

impl FireCircleConfig {
    /// Creates a config with default values.
    ///
    /// Defaults:
    /// - Rounds: 3
    /// - Failure mode: resilient
    /// - Minimum viable circle: 2
    /// - Pattern agreement threshold: 0.5
    /// - Per-call timeout: 60 s
    /// - Early stop: off
    /// - Baseline template: `fire_circle_baseline`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_rounds: 3,
            failure_mode: FailureMode::Resilient,
            min_viable_participants: 2,
            pattern_agreement_threshold: 0.5,
            per_call_timeout: Duration::from_secs(60),
            early_stop_stddev: None,
            baseline_template: EvaluationTemplate::FireCircleBaseline,
        }
    }

    /// Sets the number of rounds.
    #[must_use]
    pub const fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub const fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Sets the minimum viable circle.
    #[must_use]
    pub const fn with_min_viable_participants(mut self, min: usize) -> Self {
        self.min_viable_participants = min;
        self
    }

    /// Sets the pattern agreement threshold.
    #[must_use]
    pub const fn with_pattern_agreement_threshold(mut self, threshold: f64) -> Self {
        self.pattern_agreement_threshold = threshold;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub const fn with_per_call_timeout(mut self, timeout: Duration) -> Self {
        self.per_call_timeout = timeout;
        self
    }

    /// Enables early stop below the given falsehood stddev.
    #[must_use]
    pub const fn with_early_stop(mut self, stddev: f64) -> Self {
        self.early_stop_stddev = Some(stddev);
        self
    }

    /// Sets the template for the first round.
    #[must_use]
    pub const fn with_baseline_template(mut self, template: EvaluationTemplate) -> Self {
        self.baseline_template = template;
        self
    }

    /// Checks that every parameter is usable.
    ///
    /// # Errors
    ///
    /// [`CouncilError::InvalidConfig`] naming the first bad parameter.
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(CouncilError::InvalidConfig(
                "max_rounds must be at least 1".to_string(),
            ));
        }
        if self.min_viable_participants == 0 {
            return Err(CouncilError::InvalidConfig(
                "min_viable_participants must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.pattern_agreement_threshold) {
            return Err(CouncilError::InvalidConfig(format!(
                "pattern_agreement_threshold must be in [0, 1], got {}",
                self.pattern_agreement_threshold
            )));
        }
        if self.per_call_timeout.is_zero() {
            return Err(CouncilError::InvalidConfig(
                "per_call_timeout must be positive".to_string(),
            ));
        }
        if self.baseline_template.uses_context() {
            return Err(CouncilError::InvalidConfig(format!(
                "baseline_template '{}' needs a previous round",
                self.baseline_template
            )));
        }
        if let Some(stddev) = self.early_stop_stddev {
            if !(stddev >= 0.0) {
                return Err(CouncilError::InvalidConfig(format!(
                    "early_stop_stddev must be non-negative, got {}",
                    stddev
                )));
            }
        }
        Ok(())
    }
}

impl Default for FireCircleConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a participant stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Taking part.
    Active,
    /// Failed after contributing; history kept for audit only.
    Zombie {
        /// Round of the failure.
        failed_round: usize,
    },
    /// Failed in round 1; contributed nothing.
    Excluded {
        /// Round of the failure (always 1).
        failed_round: usize,
    },
}

impl ParticipantStatus {
    /// Whether the participant still takes part.
    pub fn is_active(&self) -> bool {
        matches!(self, ParticipantStatus::Active)
    }
}

/// One participant's judgment in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantEvaluation {
    /// Participant id.
    pub participant: String,
    /// Round number.
    pub round: usize,
    /// Judged values.
    pub tif: Tif,
    /// Participant's justification.
    pub reasoning: String,
    /// Pattern tags reported this round.
    pub patterns: Vec<String>,
    /// Whether the participant held the empty chair.
    pub empty_chair: bool,
}

/// A participant call that did not produce a judgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantFailure {
    /// Participant id.
    pub participant: String,
    /// Round number.
    pub round: usize,
    /// Failure classification.
    pub kind: FailureKind,
    /// Failure detail.
    pub message: String,
}

/// Everything that happened in one round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueRound {
    /// Round number, starting at 1.
    pub round: usize,
    /// Text sent to ordinary participants.
    pub prompt_text: String,
    /// Participant holding the empty chair.
    pub empty_chair: Option<String>,
    /// Text sent to the empty chair.
    pub empty_chair_prompt: Option<String>,
    /// Successful judgments, in participant order.
    pub evaluations: Vec<ParticipantEvaluation>,
    /// Failed calls, in participant order.
    pub failures: Vec<ParticipantFailure>,
    /// Population stddev of falsehood across this round's judgments.
    pub convergence_stddev: Option<f64>,
}

/// Per-round counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundMetrics {
    /// Round number.
    pub round: usize,
    /// Calls dispatched.
    pub dispatched: usize,
    /// Calls that produced a judgment.
    pub succeeded: usize,
    /// Calls that failed.
    pub failed: usize,
    /// Falsehood stddev.
    pub convergence_stddev: Option<f64>,
    /// Empty chair holder.
    pub empty_chair: Option<String>,
    /// Wall time of the round.
    pub elapsed_ms: u64,
}

/// The circle's final judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusJudgment {
    /// Values of the decisive evaluation.
    pub tif: Tif,
    /// Explanation citing the decisive participant and round.
    pub reasoning: String,
    /// Participant with the maximum falsehood.
    pub decisive_participant: String,
    /// Round of the maximum falsehood.
    pub decisive_round: usize,
}

/// Outcome of a completed dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireCircleResult {
    /// Unique id for audit trails.
    pub dialogue_id: Uuid,
    /// Aggregated judgment.
    pub consensus: ConsensusJudgment,
    /// Patterns meeting the agreement threshold.
    pub patterns: Vec<Pattern>,
    /// Every round that executed.
    pub dialogue_history: Vec<DialogueRound>,
    /// Share of retained patterns first raised by the empty chair.
    pub empty_chair_influence: f64,
    /// Participants that failed, in original order.
    pub failed_models: Vec<String>,
    /// Every failure record.
    pub failures: Vec<ParticipantFailure>,
    /// Whether any participant failed.
    pub partial: bool,
    /// Per-round counters.
    pub round_metrics: Vec<RoundMetrics>,
    /// Final status of each participant.
    pub statuses: BTreeMap<String, ParticipantStatus>,
    /// Rounds executed.
    pub rounds_completed: usize,
    /// Round after which early stop ended the dialogue.
    pub early_stop_round: Option<usize>,
}

impl FireCircleResult {
    /// Participants active at the end, sorted.
    pub fn active_participants(&self) -> Vec<&str> {
        self.statuses
            .iter()
            .filter(|(_, status)| status.is_active())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Latest judgment of every active participant.
    pub fn final_judgments(&self) -> Vec<&ParticipantEvaluation> {
        self.active_participants()
            .into_iter()
            .filter_map(|id| {
                self.dialogue_history
                    .iter()
                    .rev()
                    .flat_map(|round| round.evaluations.iter())
                    .find(|evaluation| evaluation.participant == id)
            })
            .collect()
    }

    /// A retained pattern by tag.
    pub fn pattern(&self, pattern_type: &str) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.pattern_type == pattern_type)
    }
}

struct EvaluationRequest {
    index: usize,
    participant: String,
    round: usize,
    prompt_text: String,
}

type CallOutcome = std::result::Result<Judgment, (FailureKind, String)>;

/// The dialogue orchestrator.
///
/// Owns the dialogue history and participant state for the duration of
/// one [`run`](Self::run); nothing is shared between runs.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use ayni_council::{FireCircle, FireCircleConfig, Judgment, ReplayClient, ReplayStep};
/// use ayni_reciprocity::Tif;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let reply = |f| ReplayStep::judgment(Judgment::new(Tif::new(0.8, 0.1, f).unwrap(), "ok"));
/// let client = ReplayClient::new()
///     .with_steps("a", [reply(0.1), reply(0.1)])
///     .with_steps("b", [reply(0.2), reply(0.3)]);
///
/// let circle = FireCircle::new(Arc::new(client), FireCircleConfig::new().with_max_rounds(2))?;
/// let result = circle.run("[USER]\nhello", &["a", "b"]).await?;
/// assert!((result.consensus.tif.falsehood() - 0.3).abs() < 1e-9);
/// # Ok(())
/// # }
/// ```
pub struct FireCircle {
    client: Arc<dyn InferenceClient>,
    parser: Arc<ResponseParser>,
    config: FireCircleConfig,
}

impl fmt::Debug for FireCircle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FireCircle")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FireCircle {
    /// Creates an orchestrator.
    ///
    /// # Errors
    ///
    /// [`CouncilError::InvalidConfig`] if the config does not validate.
    pub fn new(client: Arc<dyn InferenceClient>, config: FireCircleConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client,
            parser: Arc::new(ResponseParser::new()),
            config,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &FireCircleConfig {
        &self.config
    }

    /// Runs a dialogue over a layered prompt.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn run_prompt<S: AsRef<str>>(
        &self,
        prompt: &MultiNeutrosophicPrompt,
        participants: &[S],
    ) -> Result<FireCircleResult> {
        self.run(&prompt.render(), participants).await
    }

    /// Runs a dialogue over prompt text.
    ///
    /// # Arguments
    ///
    /// * `subject` - Text every participant evaluates
    /// * `participants` - Distinct participant ids; order fixes empty-chair rotation
    ///
    /// # Errors
    ///
    /// - [`CouncilError::InvalidConfig`] for an empty or duplicated participant list
    /// - [`CouncilError::Quorum`] when active participants fall below the minimum
    /// - [`CouncilError::ProtocolAbort`] on any failure in strict mode
    pub async fn run<S: AsRef<str>>(
        &self,
        subject: &str,
        participants: &[S],
    ) -> Result<FireCircleResult> {
        let ids = validate_participants(participants)?;
        let required = self.config.min_viable_participants;
        if ids.len() < required {
            return Err(CouncilError::Quorum {
                active: ids.len(),
                required,
                round: 0,
            });
        }

        let dialogue_id = Uuid::new_v4();
        info!(
            %dialogue_id,
            participants = ids.len(),
            max_rounds = self.config.max_rounds,
            mode = %self.config.failure_mode,
            "fire circle started"
        );

        let mut statuses = vec![ParticipantStatus::Active; ids.len()];
        let mut history: Vec<DialogueRound> = Vec::new();
        let mut round_metrics = Vec::new();
        let mut failures = Vec::new();
        let mut tracker = PatternTracker::new();
        let mut chairs: BTreeMap<usize, String> = BTreeMap::new();
        let mut early_stop_round = None;

        for round in 1..=self.config.max_rounds {
            let started = Instant::now();
            let chair = if round > 1 {
                select_empty_chair(round, &statuses)
            } else {
                None
            };
            let pattern_field = pattern_field(round);
            let context = history
                .last()
                .map(|previous| build_context(previous, &active_set(&ids, &statuses)))
                .unwrap_or_default();

            let template = if round == 1 {
                self.config.baseline_template
            } else {
                EvaluationTemplate::FireCircleDialogue
            };
            let prompt_text = template.render(subject, &context, pattern_field);
            let chair_prompt = chair
                .map(|_| EvaluationTemplate::EmptyChair.render(subject, &context, pattern_field));

            let requests: Vec<EvaluationRequest> = statuses
                .iter()
                .enumerate()
                .filter(|(_, status)| status.is_active())
                .map(|(index, _)| EvaluationRequest {
                    index,
                    participant: ids[index].clone(),
                    round,
                    prompt_text: match (&chair_prompt, chair == Some(index)) {
                        (Some(text), true) => text.clone(),
                        _ => prompt_text.clone(),
                    },
                })
                .collect();
            let dispatched = requests.len();
            tracker.open_round(round, dispatched);
            debug!(
                round,
                dispatched,
                empty_chair = chair.map(|i| ids[i].as_str()),
                "round dispatched"
            );

            let outcomes = self.fan_out(requests).await?;

            let mut evaluations = Vec::new();
            let mut round_failures = Vec::new();
            for (index, outcome) in outcomes {
                let participant = ids[index].clone();
                match outcome {
                    Ok(judgment) => {
                        let patterns = judgment.patterns_for_round(round).to_vec();
                        tracker.record(&participant, round, &patterns, &judgment.reasoning);
                        evaluations.push(ParticipantEvaluation {
                            participant,
                            round,
                            tif: judgment.tif,
                            reasoning: judgment.reasoning,
                            patterns,
                            empty_chair: chair == Some(index),
                        });
                    }
                    Err((kind, message)) => {
                        statuses[index] = if round == 1 {
                            ParticipantStatus::Excluded {
                                failed_round: round,
                            }
                        } else {
                            ParticipantStatus::Zombie {
                                failed_round: round,
                            }
                        };
                        warn!(
                            %dialogue_id,
                            round,
                            participant = %participant,
                            %kind,
                            status = if round == 1 { "excluded" } else { "zombie" },
                            "participant failed"
                        );
                        round_failures.push(ParticipantFailure {
                            participant,
                            round,
                            kind,
                            message,
                        });
                    }
                }
            }

            let convergence_stddev =
                falsehood_stddev(evaluations.iter().map(|e| e.tif.falsehood()));
            let chair_id = chair.map(|i| ids[i].clone());
            if let Some(id) = &chair_id {
                chairs.insert(round, id.clone());
            }

            round_metrics.push(RoundMetrics {
                round,
                dispatched,
                succeeded: evaluations.len(),
                failed: round_failures.len(),
                convergence_stddev,
                empty_chair: chair_id.clone(),
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            });
            failures.extend(round_failures.iter().cloned());
            history.push(DialogueRound {
                round,
                prompt_text,
                empty_chair: chair_id,
                empty_chair_prompt: chair_prompt,
                evaluations,
                failures: round_failures,
                convergence_stddev,
            });

            let active = statuses.iter().filter(|s| s.is_active()).count();
            if active < required {
                warn!(%dialogue_id, round, active, required, "quorum lost");
                return Err(CouncilError::Quorum {
                    active,
                    required,
                    round,
                });
            }

            debug!(round, active, convergence = convergence_stddev, "round complete");

            if let (Some(limit), Some(spread)) = (self.config.early_stop_stddev, convergence_stddev)
            {
                if round >= 2 && round < self.config.max_rounds && spread < limit {
                    info!(%dialogue_id, round, spread, "circle converged, stopping early");
                    early_stop_round = Some(round);
                    break;
                }
            }
        }

        let active_ids = active_set(&ids, &statuses);
        let consensus = aggregate_consensus(&history, &active_ids).ok_or_else(|| {
            CouncilError::Internal("no evaluations from active participants".to_string())
        })?;

        let patterns = tracker.retained(&active_ids, self.config.pattern_agreement_threshold);
        let empty_chair_influence = if patterns.is_empty() {
            0.0
        } else {
            let from_chair = patterns
                .iter()
                .filter(|p| chairs.get(&p.first_round) == Some(&p.first_observed_by))
                .count();
            from_chair as f64 / patterns.len() as f64
        };

        let failed_models: Vec<String> = ids
            .iter()
            .zip(&statuses)
            .filter(|(_, status)| !status.is_active())
            .map(|(id, _)| id.clone())
            .collect();

        info!(
            %dialogue_id,
            rounds = history.len(),
            falsehood = consensus.tif.falsehood(),
            decisive = %consensus.decisive_participant,
            patterns = patterns.len(),
            failed = failed_models.len(),
            "fire circle complete"
        );

        Ok(FireCircleResult {
            dialogue_id,
            consensus,
            patterns,
            rounds_completed: history.len(),
            dialogue_history: history,
            empty_chair_influence,
            partial: !failed_models.is_empty(),
            failed_models,
            failures,
            round_metrics,
            statuses: ids.into_iter().zip(statuses).collect(),
            early_stop_round,
        })
    }

    /// Dispatches one round and waits for every outcome.
    ///
    /// In strict mode the first failure returns immediately; dropping the
    /// set cancels the remaining calls.
    async fn fan_out(
        &self,
        requests: Vec<EvaluationRequest>,
    ) -> Result<Vec<(usize, CallOutcome)>> {
        let mut tasks = JoinSet::new();
        for request in requests {
            let client = Arc::clone(&self.client);
            let parser = Arc::clone(&self.parser);
            let timeout = self.config.per_call_timeout;

            tasks.spawn(async move {
                let call =
                    client.evaluate(&request.participant, &request.prompt_text, request.round);
                let outcome = match tokio::time::timeout(timeout, call).await {
                    Ok(Ok(reply)) => parser
                        .interpret(reply)
                        .map_err(|err| (err.kind(), err.to_string())),
                    Ok(Err(err)) => Err((err.kind(), err.to_string())),
                    Err(_) => Err((
                        FailureKind::Timeout,
                        format!("no reply within {} ms", timeout.as_millis()),
                    )),
                };
                (request.index, request.participant, request.round, outcome)
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let (index, participant, round, outcome) = joined.map_err(|err| {
                CouncilError::Internal(format!("evaluation task ended abnormally: {}", err))
            })?;

            if self.config.failure_mode == FailureMode::Strict {
                if let Err((kind, message)) = outcome {
                    warn!(round, participant = %participant, %kind, "strict mode abort");
                    tasks.abort_all();
                    return Err(CouncilError::ProtocolAbort {
                        participant,
                        round,
                        kind,
                        message,
                    });
                }
            }
            outcomes.push((index, outcome));
        }

        outcomes.sort_by_key(|(index, _)| *index);
        Ok(outcomes)
    }
}

fn validate_participants<S: AsRef<str>>(participants: &[S]) -> Result<Vec<String>> {
    if participants.is_empty() {
        return Err(CouncilError::InvalidConfig(
            "at least one participant is required".to_string(),
        ));
    }
    let mut seen = BTreeSet::new();
    let mut ids = Vec::with_capacity(participants.len());
    for participant in participants {
        let id = participant.as_ref().trim();
        if id.is_empty() {
            return Err(CouncilError::InvalidConfig(
                "participant ids must not be blank".to_string(),
            ));
        }
        if !seen.insert(id.to_string()) {
            return Err(CouncilError::InvalidConfig(format!(
                "participant '{}' listed more than once",
                id
            )));
        }
        ids.push(id.to_string());
    }
    Ok(ids)
}

/// `participants[(round - 1) mod n]`, probing forward past inactive
/// participants. `None` only when nobody is active.
pub(crate) fn select_empty_chair(round: usize, statuses: &[ParticipantStatus]) -> Option<usize> {
    let n = statuses.len();
    if n == 0 {
        return None;
    }
    let start = round.saturating_sub(1) % n;
    (0..n)
        .map(|offset| (start + offset) % n)
        .find(|&index| statuses[index].is_active())
}

fn pattern_field(round: usize) -> Option<&'static str> {
    match round {
        0 | 1 => None,
        2 => Some("patterns_observed"),
        _ => Some("consensus_patterns"),
    }
}

fn active_set(ids: &[String], statuses: &[ParticipantStatus]) -> BTreeSet<String> {
    ids.iter()
        .zip(statuses)
        .filter(|(_, status)| status.is_active())
        .map(|(id, _)| id.clone())
        .collect()
}

fn build_context(previous: &DialogueRound, active: &BTreeSet<String>) -> String {
    let mut lines = vec![format!("Round {} judgments:", previous.round)];
    for evaluation in previous
        .evaluations
        .iter()
        .filter(|e| active.contains(&e.participant))
    {
        let chair = if evaluation.empty_chair {
            " (empty chair)"
        } else {
            ""
        };
        lines.push(format!(
            "- {}{}: {}",
            evaluation.participant, chair, evaluation.tif
        ));
        if !evaluation.reasoning.is_empty() {
            lines.push(format!("  {}", evaluation.reasoning));
        }
        if !evaluation.patterns.is_empty() {
            lines.push(format!("  patterns: {}", evaluation.patterns.join(", ")));
        }
    }
    lines.join("\n")
}

/// Population standard deviation, `None` for no samples.
pub(crate) fn falsehood_stddev<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let values: Vec<f64> = values.into_iter().collect();
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

/// Maximum falsehood over every evaluation by an active participant.
/// Ties go to the later evaluation.
fn aggregate_consensus(
    history: &[DialogueRound],
    active: &BTreeSet<String>,
) -> Option<ConsensusJudgment> {
    let decisive = history
        .iter()
        .flat_map(|round| round.evaluations.iter())
        .filter(|e| active.contains(&e.participant))
        .fold(None::<&ParticipantEvaluation>, |best, e| match best {
            Some(b) if b.tif.falsehood() > e.tif.falsehood() => Some(b),
            _ => Some(e),
        })?;

    Some(ConsensusJudgment {
        tif: decisive.tif,
        reasoning: format!(
            "maximum falsehood {:.2} from {} in round {}: {}",
            decisive.tif.falsehood(),
            decisive.participant,
            decisive.round,
            decisive.reasoning
        ),
        decisive_participant: decisive.participant.clone(),
        decisive_round: decisive.round,
    })
}
