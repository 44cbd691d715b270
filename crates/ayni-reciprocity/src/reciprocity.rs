//! # Reciprocity Scorer
//!
//! Turns the T/I/F judgments on a layered prompt into an ayni balance, an
//! exchange-type classification and a trust assessment.
//!
//! ## Balance
//!
//! ```text
//! var'    = var(layer truths) × (1 − 0.5 × trust.strength)
//! balance = T + 0.3·√var'             if T > 0.7   (productive disagreement)
//!         = T − 0.2·var'              otherwise
//! balance −= 0.2 · |I − 0.3|          (too little or too much uncertainty)
//! balance −= F
//! balance −= 0.8                      if any layer F > 0.6
//! balance −= 0.3 / 0.2                role confusion / context saturation
//! ```
//!
//! The result is clamped to [-1, 1]. A severe layer additionally caps the
//! balance at −0.8 so that polite layers around it cannot lift the score.
//!
//! ## Classification
//!
//! | Balance | Call |
//! |---------|------|
//! | < −0.3 | Extractive |
//! | > 0.5 | Generative |
//! | \|b\| < 0.1 | Neutral |
//! | otherwise | Reciprocal |
//!
//! Multi-layer prompts must have the mean cross-layer value flow corroborate
//! the call; an uncorroborated call is downgraded one step toward neutral.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ReciprocityError;
use crate::neutrosophic::{Contradiction, MultiNeutrosophicPrompt, Tif};
use crate::trust::{TrustCalculator, TrustField, TrustViolation};
use crate::Result;

/// Aggregate truth above which cross-layer variance earns a bonus.
pub const CREATIVE_TENSION_THRESHOLD: f64 = 0.7;
const TENSION_BONUS: f64 = 0.3;
const VARIANCE_PENALTY: f64 = 0.2;

/// Indeterminacy level that incurs no penalty.
pub const OPTIMAL_INDETERMINACY: f64 = 0.3;
const INDETERMINACY_PENALTY: f64 = 0.2;

/// Layer falsehood above which the severe-layer penalty applies.
pub const SEVERE_LAYER_FALSEHOOD: f64 = 0.6;
/// Flat penalty (and ceiling) for a severe layer.
pub const SEVERE_LAYER_PENALTY: f64 = 0.8;

const ROLE_CONFUSION_PENALTY: f64 = 0.3;
const SATURATION_PENALTY: f64 = 0.2;

const EXTRACTIVE_BALANCE: f64 = -0.3;
const GENERATIVE_BALANCE: f64 = 0.5;
const NEUTRAL_BAND: f64 = 0.1;

const EXTRACTIVE_FLOW_CEILING: f64 = 0.6;
const GENERATIVE_FLOW_FLOOR: f64 = 0.6;
const RECIPROCAL_FLOW_FLOOR: f64 = 0.3;

/// Classification of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeType {
    /// Takes more than it gives.
    Extractive,
    /// Gives and takes in balance.
    Reciprocal,
    /// Creates more value than it consumes.
    Generative,
    /// No meaningful flow either way.
    Neutral,
}

impl std::fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExchangeType::Extractive => "EXTRACTIVE",
            ExchangeType::Reciprocal => "RECIPROCAL",
            ExchangeType::Generative => "GENERATIVE",
            ExchangeType::Neutral => "NEUTRAL",
        };
        f.write_str(name)
    }
}

/// Value flowing from a higher-priority layer to a lower one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueFlow {
    /// Index of the higher-priority layer.
    pub from: usize,
    /// Index of the lower-priority layer.
    pub to: usize,
    /// Flow value in [0, 1].
    pub value: f64,
}

/// Result of scoring one prompt. Built fresh per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReciprocityMetrics {
    /// Balance in [-1, 1].
    pub ayni_balance: f64,
    /// Exchange classification.
    pub exchange_type: ExchangeType,
    /// Per layer-pair value flow.
    pub value_flows: Vec<ValueFlow>,
    /// High truth with disagreement and no trust violations.
    pub tension_productive: bool,
    /// The exchange should be corrected before proceeding.
    pub needs_adjustment: bool,
    /// Trust between layers.
    pub trust_field: TrustField,
    /// Priority-weighted aggregate the balance was computed from.
    pub aggregate: Tif,
    /// Highest aggregate falsehood of any single layer.
    pub max_layer_falsehood: f64,
    /// Contradictions between layers.
    pub contradictions: Vec<Contradiction>,
}

impl ReciprocityMetrics {
    /// Value flow between two layers, if both were evaluated.
    pub fn value_flow(&self, from: usize, to: usize) -> Option<f64> {
        self.value_flows
            .iter()
            .find(|flow| flow.from == from && flow.to == to)
            .map(|flow| flow.value)
    }

    /// Mean value flow, or `None` for single-layer prompts.
    pub fn mean_value_flow(&self) -> Option<f64> {
        mean_flow(&self.value_flows)
    }
}

fn mean_flow(flows: &[ValueFlow]) -> Option<f64> {
    if flows.is_empty() {
        None
    } else {
        Some(flows.iter().map(|f| f.value).sum::<f64>() / flows.len() as f64)
    }
}

/// Scores prompts whose layers already carry evaluator-supplied T/I/F.
///
/// The scorer is a pure function of its input. Values were validated when
/// the [`Tif`] triples were built, so the only failure is an unevaluated
/// prompt.
#[derive(Debug, Clone, Default)]
pub struct ReciprocityScorer {
    trust: TrustCalculator,
}

impl ReciprocityScorer {
    /// Creates a scorer with the default trust calculator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scorer with a custom trust calculator.
    pub fn with_trust_calculator(trust: TrustCalculator) -> Self {
        Self { trust }
    }

    /// Scores a prompt.
    ///
    /// # Errors
    ///
    /// [`ReciprocityError::NoEvaluations`] when no layer has been evaluated.
    pub fn score(&self, prompt: &MultiNeutrosophicPrompt) -> Result<ReciprocityMetrics> {
        let aggregate = prompt
            .weighted_aggregate()
            .ok_or(ReciprocityError::NoEvaluations)?;
        let trust_field = self.trust.calculate(prompt);

        let raw_variance = prompt.cross_layer_truth_variance();
        let modulated = raw_variance * (1.0 - 0.5 * trust_field.strength);

        let mut balance = if aggregate.truth() > CREATIVE_TENSION_THRESHOLD {
            aggregate.truth() + TENSION_BONUS * modulated.sqrt()
        } else {
            aggregate.truth() - VARIANCE_PENALTY * modulated
        };
        balance -= INDETERMINACY_PENALTY * (aggregate.indeterminacy() - OPTIMAL_INDETERMINACY).abs();
        balance -= aggregate.falsehood();

        let max_layer_falsehood = prompt.max_layer_falsehood().unwrap_or(0.0);
        let severe = max_layer_falsehood > SEVERE_LAYER_FALSEHOOD;
        if severe {
            balance -= SEVERE_LAYER_PENALTY;
        }
        if trust_field.has_violation(TrustViolation::RoleConfusion) {
            balance -= ROLE_CONFUSION_PENALTY;
        }
        if trust_field.has_violation(TrustViolation::ContextSaturation) {
            balance -= SATURATION_PENALTY;
        }

        let mut balance = balance.clamp(-1.0, 1.0);
        if severe {
            balance = balance.min(-SEVERE_LAYER_PENALTY);
        }

        let value_flows = value_flows(prompt);
        let exchange_type = classify(balance, mean_flow(&value_flows), severe);
        let contradictions = prompt.detect_contradictions();

        let tension_productive = aggregate.truth() > CREATIVE_TENSION_THRESHOLD
            && modulated > 0.0
            && trust_field.violations.is_empty();
        let needs_adjustment = balance < 0.0
            || !trust_field.violations.is_empty()
            || !contradictions.is_empty();

        debug!(
            balance,
            %exchange_type,
            trust = trust_field.strength,
            max_layer_falsehood,
            "prompt scored"
        );

        Ok(ReciprocityMetrics {
            ayni_balance: balance,
            exchange_type,
            value_flows,
            tension_productive,
            needs_adjustment,
            trust_field,
            aggregate,
            max_layer_falsehood,
            contradictions,
        })
    }
}

/// Flow for every ordered (higher, lower) pair of evaluated layers.
///
/// flow = mean(higher.structure × higher.agency_preserving,
///             lower.specificity × lower.structure_respecting)
/// with structure = T, agency/structure respect = 1 − F, specificity = 1 − I.
fn value_flows(prompt: &MultiNeutrosophicPrompt) -> Vec<ValueFlow> {
    let mut ordered: Vec<(usize, _, Tif)> = prompt
        .layers()
        .iter()
        .enumerate()
        .filter_map(|(idx, l)| l.aggregate().map(|agg| (idx, l.priority(), agg)))
        .collect();
    ordered.sort_by(|a, b| b.1.cmp(&a.1));

    let mut flows = Vec::new();
    for (pos, (from, _, higher)) in ordered.iter().enumerate() {
        for (to, _, lower) in ordered.iter().skip(pos + 1) {
            let given = higher.truth() * (1.0 - higher.falsehood());
            let received = (1.0 - lower.indeterminacy()) * (1.0 - lower.falsehood());
            flows.push(ValueFlow {
                from: *from,
                to: *to,
                value: (given + received) / 2.0,
            });
        }
    }
    flows
}

fn classify(balance: f64, mean_flow: Option<f64>, severe: bool) -> ExchangeType {
    let by_balance = if balance < EXTRACTIVE_BALANCE {
        ExchangeType::Extractive
    } else if balance > GENERATIVE_BALANCE {
        ExchangeType::Generative
    } else if balance.abs() < NEUTRAL_BAND {
        ExchangeType::Neutral
    } else {
        ExchangeType::Reciprocal
    };

    let Some(flow) = mean_flow else {
        return by_balance;
    };

    match by_balance {
        ExchangeType::Extractive if severe || flow < EXTRACTIVE_FLOW_CEILING => {
            ExchangeType::Extractive
        }
        ExchangeType::Extractive => ExchangeType::Neutral,
        ExchangeType::Generative if flow > GENERATIVE_FLOW_FLOOR => ExchangeType::Generative,
        ExchangeType::Generative => ExchangeType::Reciprocal,
        ExchangeType::Reciprocal if flow >= RECIPROCAL_FLOW_FLOOR => ExchangeType::Reciprocal,
        ExchangeType::Reciprocal | ExchangeType::Neutral => ExchangeType::Neutral,
    }
}
