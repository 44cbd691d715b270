//! # Neutrosophic Layer Model
//!
//! Layered prompts and their multi-valued Truth/Indeterminacy/Falsehood
//! judgments.
//!
//! ## Invariants
//!
//! - Every T/I/F component is within [0, 1]. [`Tif`] can only be built
//!   through [`Tif::new`] (or deserialised through the same check).
//! - A layer's evaluation list is append-only for the life of the layer.
//! - A layer's aggregate is recomputed from the list on every call and is
//!   never cached.
//!
//! ## Contradictions
//!
//! | Kind | Condition |
//! |------|-----------|
//! | Direct negation | one layer's truth is high while another's falsehood is high |
//! | Scope conflict | both truths are high but one layer has high internal variance |

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ReciprocityError;
use crate::Result;

/// Truth above this level counts as "high" for contradiction checks.
pub const HIGH_TRUTH: f64 = 0.7;

/// Falsehood above this level counts as "high" for contradiction checks.
pub const HIGH_FALSEHOOD: f64 = 0.7;

/// Internal truth variance above this level (stddev 0.2) counts as high.
pub const HIGH_VARIANCE: f64 = 0.04;

/// Aggregate indeterminacy above which a prompt is liminal.
pub const LIMINAL_INDETERMINACY: f64 = 0.6;

/// Single-layer indeterminacy above which a prompt is liminal.
pub const LIMINAL_LAYER_INDETERMINACY: f64 = 0.8;

/// A validated (truth, indeterminacy, falsehood) triple.
///
/// The components are independent: they do not need to sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TifRepr")]
pub struct Tif {
    truth: f64,
    indeterminacy: f64,
    falsehood: f64,
}

#[derive(Deserialize)]
struct TifRepr {
    truth: f64,
    indeterminacy: f64,
    falsehood: f64,
}

impl TryFrom<TifRepr> for Tif {
    type Error = ReciprocityError;

    fn try_from(raw: TifRepr) -> Result<Self> {
        Tif::new(raw.truth, raw.indeterminacy, raw.falsehood)
    }
}

fn check_unit(component: &'static str, value: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ReciprocityError::OutOfRange { component, value })
    }
}

impl Tif {
    /// Creates a triple, rejecting any component outside [0, 1] or NaN.
    ///
    /// # Example
    ///
    /// ```rust
    /// use ayni_reciprocity::Tif;
    ///
    /// assert!(Tif::new(0.8, 0.1, 0.0).is_ok());
    /// assert!(Tif::new(1.2, 0.1, 0.0).is_err());
    /// ```
    pub fn new(truth: f64, indeterminacy: f64, falsehood: f64) -> Result<Self> {
        Ok(Self {
            truth: check_unit("truth", truth)?,
            indeterminacy: check_unit("indeterminacy", indeterminacy)?,
            falsehood: check_unit("falsehood", falsehood)?,
        })
    }

    /// Truth component.
    pub fn truth(&self) -> f64 {
        self.truth
    }

    /// Indeterminacy component.
    pub fn indeterminacy(&self) -> f64 {
        self.indeterminacy
    }

    /// Falsehood component.
    pub fn falsehood(&self) -> f64 {
        self.falsehood
    }

    /// Component-wise mean, or `None` for an empty input.
    pub fn mean<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = Tif>,
    {
        Self::weighted_mean(values.into_iter().map(|v| (v, 1.0)))
    }

    /// Component-wise weighted mean, or `None` when total weight is zero.
    ///
    /// Weights must be non-negative; the mean of in-range values stays in range.
    pub fn weighted_mean<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = (Tif, f64)>,
    {
        let (mut t, mut i, mut f, mut total) = (0.0, 0.0, 0.0, 0.0);
        for (value, weight) in values {
            t += value.truth * weight;
            i += value.indeterminacy * weight;
            f += value.falsehood * weight;
            total += weight;
        }
        if total <= 0.0 {
            return None;
        }
        Some(Self {
            truth: (t / total).clamp(0.0, 1.0),
            indeterminacy: (i / total).clamp(0.0, 1.0),
            falsehood: (f / total).clamp(0.0, 1.0),
        })
    }

    /// Components as an array in T, I, F order.
    pub fn components(&self) -> [f64; 3] {
        [self.truth, self.indeterminacy, self.falsehood]
    }
}

impl fmt::Display for Tif {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "T={:.2} I={:.2} F={:.2}",
            self.truth, self.indeterminacy, self.falsehood
        )
    }
}

/// Where an evaluation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Deterministic structural heuristic.
    Heuristic,
    /// Single model-based semantic judgment.
    Semantic,
    /// Aggregated multi-round Fire Circle dialogue.
    FireCircle,
    /// Observer model framing.
    Observer,
    /// Human annotation.
    Human,
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceType::Heuristic => "heuristic",
            SourceType::Semantic => "semantic",
            SourceType::FireCircle => "fire_circle",
            SourceType::Observer => "observer",
            SourceType::Human => "human",
        };
        f.write_str(name)
    }
}

/// Ordered rank of a prompt layer. `System > Application > User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerPriority {
    /// End-user input.
    User,
    /// Application scaffolding (templates, retrieved context).
    Application,
    /// System instructions.
    System,
}

impl LayerPriority {
    /// Weight used for priority-weighted aggregation.
    pub fn weight(&self) -> f64 {
        match self {
            LayerPriority::System => 3.0,
            LayerPriority::Application => 2.0,
            LayerPriority::User => 1.0,
        }
    }
}

impl fmt::Display for LayerPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerPriority::System => write!(f, "SYSTEM"),
            LayerPriority::Application => write!(f, "APPLICATION"),
            LayerPriority::User => write!(f, "USER"),
        }
    }
}

/// One judgment of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// The judged values.
    #[serde(flatten)]
    pub tif: Tif,
    /// Who produced the judgment.
    pub source: SourceType,
}

/// A single layer of a prompt with its evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeutrosophicLayer {
    content: String,
    priority: LayerPriority,
    #[serde(default)]
    evaluations: Vec<Evaluation>,
}

impl NeutrosophicLayer {
    /// Creates an unevaluated layer.
    pub fn new(content: impl Into<String>, priority: LayerPriority) -> Self {
        Self {
            content: content.into(),
            priority,
            evaluations: Vec::new(),
        }
    }

    /// Layer text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Layer rank.
    pub fn priority(&self) -> LayerPriority {
        self.priority
    }

    /// Evaluations in insertion order.
    pub fn evaluations(&self) -> &[Evaluation] {
        &self.evaluations
    }

    /// Appends an evaluation. Evaluations are never removed or replaced.
    pub fn add_evaluation(&mut self, tif: Tif, source: SourceType) {
        self.evaluations.push(Evaluation { tif, source });
    }

    /// Whether at least one evaluation exists.
    pub fn is_evaluated(&self) -> bool {
        !self.evaluations.is_empty()
    }

    /// Per-component mean over all evaluations, or `None` if unevaluated.
    pub fn aggregate(&self) -> Option<Tif> {
        Tif::mean(self.evaluations.iter().map(|e| e.tif))
    }

    /// Population variance of truth across this layer's own evaluations.
    pub fn truth_variance(&self) -> f64 {
        variance(self.evaluations.iter().map(|e| e.tif.truth()))
    }

    /// Highest single falsehood recorded on this layer.
    pub fn max_falsehood(&self) -> Option<f64> {
        self.evaluations
            .iter()
            .map(|e| e.tif.falsehood())
            .reduce(f64::max)
    }

    /// High truth coexisting with high internal variance (ch'ixi).
    pub fn has_creative_tension(&self) -> bool {
        self.aggregate()
            .is_some_and(|agg| agg.truth() > HIGH_TRUTH && self.truth_variance() > HIGH_VARIANCE)
    }
}

/// How two layers contradict each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionKind {
    /// One layer reads as true while the other reads as false.
    DirectNegation,
    /// Both read as true but at least one is internally contested.
    ScopeConflict,
}

/// A contradiction between two layers, by index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    /// Index of the earlier layer.
    pub first: usize,
    /// Index of the later layer.
    pub second: usize,
    /// Contradiction kind.
    pub kind: ContradictionKind,
    /// Human-readable explanation.
    pub description: String,
}

/// An ordered collection of layers plus free-form metadata.
///
/// The prompt owns its layers. Layers can gain evaluations through
/// [`layers_mut`](Self::layers_mut) but can only be added, never removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiNeutrosophicPrompt {
    #[serde(default)]
    layers: Vec<NeutrosophicLayer>,
    #[serde(default)]
    metadata: BTreeMap<String, serde_json::Value>,
}

impl MultiNeutrosophicPrompt {
    /// Creates an empty prompt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer and returns it for evaluation.
    pub fn add_layer(
        &mut self,
        content: impl Into<String>,
        priority: LayerPriority,
    ) -> &mut NeutrosophicLayer {
        self.layers.push(NeutrosophicLayer::new(content, priority));
        let last = self.layers.len() - 1;
        &mut self.layers[last]
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Layers in insertion order.
    pub fn layers(&self) -> &[NeutrosophicLayer] {
        &self.layers
    }

    /// Mutable access for appending evaluations.
    pub fn layers_mut(&mut self) -> &mut [NeutrosophicLayer] {
        &mut self.layers
    }

    /// Metadata entries.
    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Layers that carry at least one evaluation, with their index.
    pub fn evaluated_layers(&self) -> impl Iterator<Item = (usize, &NeutrosophicLayer)> {
        self.layers.iter().enumerate().filter(|(_, l)| l.is_evaluated())
    }

    /// Priority-weighted mean of layer aggregates.
    ///
    /// Returns `None` when no layer has been evaluated.
    pub fn weighted_aggregate(&self) -> Option<Tif> {
        Tif::weighted_mean(
            self.layers
                .iter()
                .filter_map(|l| l.aggregate().map(|agg| (agg, l.priority().weight()))),
        )
    }

    /// Population variance of truth across layer aggregates.
    pub fn cross_layer_truth_variance(&self) -> f64 {
        variance(self.layers.iter().filter_map(|l| l.aggregate()).map(|a| a.truth()))
    }

    /// Highest aggregate falsehood of any single layer.
    pub fn max_layer_falsehood(&self) -> Option<f64> {
        self.layers
            .iter()
            .filter_map(|l| l.aggregate())
            .map(|a| a.falsehood())
            .reduce(f64::max)
    }

    /// Pairwise contradiction detection over evaluated layers.
    pub fn detect_contradictions(&self) -> Vec<Contradiction> {
        let evaluated: Vec<(usize, &NeutrosophicLayer, Tif)> = self
            .layers
            .iter()
            .enumerate()
            .filter_map(|(idx, l)| l.aggregate().map(|agg| (idx, l, agg)))
            .collect();

        let mut found = Vec::new();
        for (pos, (i, layer_a, a)) in evaluated.iter().enumerate() {
            for (j, layer_b, b) in evaluated.iter().skip(pos + 1) {
                let negation = (a.truth() > HIGH_TRUTH && b.falsehood() > HIGH_FALSEHOOD)
                    || (b.truth() > HIGH_TRUTH && a.falsehood() > HIGH_FALSEHOOD);

                if negation {
                    found.push(Contradiction {
                        first: *i,
                        second: *j,
                        kind: ContradictionKind::DirectNegation,
                        description: format!(
                            "{} layer ({}) negates {} layer ({})",
                            layer_a.priority(),
                            a,
                            layer_b.priority(),
                            b
                        ),
                    });
                    continue;
                }

                let contested = layer_a.truth_variance() > HIGH_VARIANCE
                    || layer_b.truth_variance() > HIGH_VARIANCE;
                if a.truth() > HIGH_TRUTH && b.truth() > HIGH_TRUTH && contested {
                    found.push(Contradiction {
                        first: *i,
                        second: *j,
                        kind: ContradictionKind::ScopeConflict,
                        description: format!(
                            "{} and {} layers both read as true but are internally contested",
                            layer_a.priority(),
                            layer_b.priority()
                        ),
                    });
                }
            }
        }
        found
    }

    /// High-uncertainty predicate.
    ///
    /// True when the weighted aggregate indeterminacy exceeds
    /// [`LIMINAL_INDETERMINACY`] or any one layer exceeds
    /// [`LIMINAL_LAYER_INDETERMINACY`].
    pub fn is_liminal(&self) -> bool {
        let aggregate_high = self
            .weighted_aggregate()
            .is_some_and(|agg| agg.indeterminacy() > LIMINAL_INDETERMINACY);
        let layer_high = self
            .layers
            .iter()
            .filter_map(|l| l.aggregate())
            .any(|agg| agg.indeterminacy() > LIMINAL_LAYER_INDETERMINACY);
        aggregate_high || layer_high
    }

    /// Text form used when asking evaluators about this prompt.
    pub fn render(&self) -> String {
        self.layers
            .iter()
            .map(|l| format!("[{}]\n{}", l.priority(), l.content()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Population variance; zero for fewer than two samples.
pub(crate) fn variance<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let values: Vec<f64> = values.into_iter().collect();
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
}
