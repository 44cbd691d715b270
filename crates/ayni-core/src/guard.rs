//! The unified Ayni facade.
//!
//! [`AyniGuard`] runs one Fire Circle per prompt layer, feeds the consensus
//! back into the prompt as evaluations, scores the result and turns it into
//! a [`Verdict`].

use std::fmt;
use std::sync::Arc;

use ayni_council::{FireCircle, FireCircleResult, InferenceClient};
use ayni_reciprocity::{
    ConsensusCalculator, ConsensusMeasure, ExchangeType, LayerPriority, MultiNeutrosophicPrompt,
    ReciprocityMetrics, ReciprocityScorer, SourceType, Tif,
};
use ayni_session::{InteractionObservation, Recommendation, SessionAccumulator, Trajectory};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::AyniConfig,
    error::AyniError,
    verdict::{BlockReason, ReviewFlag, Verdict},
    Result,
};

/// The circle's judgment of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerAssessment {
    /// Layer index.
    pub layer: usize,
    /// Layer priority.
    pub priority: LayerPriority,
    /// Full dialogue record.
    pub circle: FireCircleResult,
    /// Agreement among the active participants' final judgments.
    pub agreement: ConsensusMeasure,
}

/// Everything [`AyniGuard::assess`] produced for one prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    /// Final verdict.
    pub verdict: Verdict,
    /// Reciprocity metrics of the evaluated prompt.
    pub metrics: ReciprocityMetrics,
    /// Per-layer circle results; empty when the prompt was scored as given.
    pub layers: Vec<LayerAssessment>,
    /// Session advice, when a session was supplied.
    pub recommendation: Option<Recommendation>,
}

/// The unified reciprocity guard.
///
/// # Pipeline
///
/// 1. Fire Circle per layer (participants see the whole prompt)
/// 2. Consensus appended to the layer as a [`SourceType::FireCircle`] evaluation
/// 3. Reciprocity scoring of the whole prompt
/// 4. Session accumulation, if a session is supplied
/// 5. Verdict
///
/// Circle failures (quorum loss, strict aborts) propagate as errors. No
/// verdict is produced from a dialogue that did not complete.
///
/// # Example
///
/// ```rust,ignore
/// let guard = AyniGuard::new(AyniConfig::load("ayni.toml")?, Arc::new(client))?;
/// let assessment = guard.assess(&mut prompt, &["a", "b", "c"], Some(&mut session)).await?;
///
/// if assessment.verdict.is_blocked() {
///     // refuse
/// }
/// ```
pub struct AyniGuard {
    config: AyniConfig,
    circle: FireCircle,
    scorer: ReciprocityScorer,
    consensus: ConsensusCalculator,
}

impl fmt::Debug for AyniGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AyniGuard")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AyniGuard {
    /// Create a guard from configuration and an inference client.
    ///
    /// # Errors
    ///
    /// [`AyniError::Config`] or [`AyniError::Council`] if the configuration
    /// does not validate.
    pub fn new(config: AyniConfig, client: Arc<dyn InferenceClient>) -> Result<Self> {
        config.validate()?;
        let circle = FireCircle::new(client, config.circle.fire_circle_config()?)?;
        let scorer = config.scoring.scorer();
        let consensus = config.scoring.consensus();

        info!(
            max_rounds = config.circle.max_rounds,
            mode = %config.circle.failure_mode,
            "Ayni guard initialized"
        );

        Ok(Self {
            config,
            circle,
            scorer,
            consensus,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &AyniConfig {
        &self.config
    }

    /// Default participants from configuration.
    pub fn participants(&self) -> &[String] {
        &self.config.circle.participants
    }

    /// Score a prompt whose layers already carry evaluations.
    pub fn score(&self, prompt: &MultiNeutrosophicPrompt) -> Result<ReciprocityMetrics> {
        Ok(self.scorer.score(prompt)?)
    }

    /// Assess a prompt with the Fire Circle.
    ///
    /// # Arguments
    ///
    /// * `prompt` - Layered prompt; gains one evaluation per layer, and only
    ///   once every layer's circle has completed
    /// * `participants` - Circle participant ids
    /// * `session` - Session to update, if any
    ///
    /// # Errors
    ///
    /// - [`AyniError::InvalidPrompt`] for a prompt without layers
    /// - [`AyniError::Council`] when a circle cannot complete
    /// - [`AyniError::Session`] if the observation is rejected
    pub async fn assess<S: AsRef<str>>(
        &self,
        prompt: &mut MultiNeutrosophicPrompt,
        participants: &[S],
        session: Option<&mut SessionAccumulator>,
    ) -> Result<Assessment> {
        if prompt.layers().is_empty() {
            return Err(AyniError::InvalidPrompt("prompt has no layers".to_string()));
        }

        // Every circle completes before the prompt is touched, so a failure
        // on a later layer leaves no evaluations behind.
        let mut runs = Vec::with_capacity(prompt.layers().len());
        for index in 0..prompt.layers().len() {
            let subject = layer_subject(prompt, index);
            let priority = prompt.layers()[index].priority();
            debug!(layer = index, %priority, "convening circle");

            let circle = self.circle.run(&subject, participants).await?;
            runs.push((index, priority, circle));
        }

        let mut layers = Vec::with_capacity(runs.len());
        for (index, priority, circle) in runs {
            let finals: Vec<Tif> = circle.final_judgments().iter().map(|e| e.tif).collect();
            let mut staged = prompt.layers()[index].clone();
            staged.add_evaluation(circle.consensus.tif, SourceType::FireCircle);
            let agreement = self.consensus.measure(&finals, staged.has_creative_tension())?;

            if circle.partial {
                warn!(
                    layer = index,
                    failed = ?circle.failed_models,
                    "layer judged by a partial circle"
                );
            }
            layers.push(LayerAssessment {
                layer: index,
                priority,
                circle,
                agreement,
            });
        }

        for assessed in &layers {
            prompt.layers_mut()[assessed.layer]
                .add_evaluation(assessed.circle.consensus.tif, SourceType::FireCircle);
        }

        self.finish(prompt, layers, session)
    }

    /// Score a pre-evaluated prompt and derive a verdict without a circle.
    pub fn assess_evaluated(
        &self,
        prompt: &MultiNeutrosophicPrompt,
        session: Option<&mut SessionAccumulator>,
    ) -> Result<Assessment> {
        self.finish(prompt, Vec::new(), session)
    }

    fn finish(
        &self,
        prompt: &MultiNeutrosophicPrompt,
        layers: Vec<LayerAssessment>,
        session: Option<&mut SessionAccumulator>,
    ) -> Result<Assessment> {
        let metrics = self.scorer.score(prompt)?;

        let recommendation = match session {
            Some(session) => {
                session.accumulate(InteractionObservation::from_metrics(&metrics))?;
                Some(session.recommend())
            }
            None => None,
        };

        let verdict = self.decide(prompt, &metrics, &layers, recommendation.as_ref());
        if self.config.global.audit_logging {
            info!(
                balance = metrics.ayni_balance,
                exchange = %metrics.exchange_type,
                verdict = ?verdict,
                "prompt assessed"
            );
        } else {
            debug!(verdict = ?verdict, "prompt assessed");
        }

        Ok(Assessment {
            verdict,
            metrics,
            layers,
            recommendation,
        })
    }

    fn decide(
        &self,
        prompt: &MultiNeutrosophicPrompt,
        metrics: &ReciprocityMetrics,
        layers: &[LayerAssessment],
        recommendation: Option<&Recommendation>,
    ) -> Verdict {
        if metrics.exchange_type == ExchangeType::Extractive {
            return Verdict::block(BlockReason::ExtractiveExchange {
                balance: metrics.ayni_balance,
                max_layer_falsehood: metrics.max_layer_falsehood,
            });
        }

        if let Some(recommendation) = recommendation {
            if self.config.global.block_hostile_sessions
                && recommendation.trajectory == Trajectory::Hostile
            {
                return Verdict::block(BlockReason::HostileSession {
                    signals: recommendation.rationale.clone(),
                });
            }
        }

        let mut flags = Vec::new();
        for layer in layers {
            if layer.agreement.requires_negotiation {
                flags.push(ReviewFlag::NegotiationRequired {
                    layer: layer.layer,
                    consensus_score: layer.agreement.consensus_score,
                });
            }
            if self.config.global.review_partial_circles && layer.circle.partial {
                flags.push(ReviewFlag::PartialCircle {
                    layer: layer.layer,
                    failed: layer.circle.failed_models.clone(),
                });
            }
        }
        if !metrics.contradictions.is_empty() {
            flags.push(ReviewFlag::Contradictions {
                count: metrics.contradictions.len(),
            });
        }
        if prompt.is_liminal() {
            flags.push(ReviewFlag::Liminal {
                indeterminacy: metrics.aggregate.indeterminacy(),
            });
        }
        for violation in &metrics.trust_field.violations {
            flags.push(ReviewFlag::TrustViolation {
                violation: violation.to_string(),
            });
        }

        if flags.is_empty() {
            Verdict::allow()
        } else {
            Verdict::review(flags)
        }
    }
}

/// Whole prompt followed by the layer the circle is asked about.
fn layer_subject(prompt: &MultiNeutrosophicPrompt, index: usize) -> String {
    let layers = prompt.layers();
    let layer = &layers[index];
    format!(
        "{}\n\nEVALUATE LAYER {} OF {} [{}]:\n{}",
        prompt.render(),
        index + 1,
        layers.len(),
        layer.priority(),
        layer.content()
    )
}
