//! Consensus measure over independent judgments of the same layer.
//!
//! Dispersion per component is the root-mean-square distance from the mean,
//! normalized by a maximum dispersion of 0.5 and capped at 1. Raw consensus
//! is one minus the average dispersion, then adjusted:
//!
//! - **Creative tension boost**: mean truth > 0.7, average dispersion in
//!   [0.1, 0.3] and at least one contributing layer in creative tension.
//!   Judges agree the content is good and disagree on texture.
//! - **Incoherence discount**: mean truth < 0.4 and average dispersion > 0.3
//!   cuts consensus by 20%.

use serde::{Deserialize, Serialize};

use crate::error::ReciprocityError;
use crate::neutrosophic::{NeutrosophicLayer, Tif};
use crate::Result;

/// Dispersion that normalizes to 1.0.
pub const MAX_DISPERSION: f64 = 0.5;

const TENSION_TRUTH: f64 = 0.7;
const TENSION_BAND: (f64, f64) = (0.1, 0.3);
const TENSION_BOOST: f64 = 0.5;
const INCOHERENT_TRUTH: f64 = 0.4;
const INCOHERENT_DISPERSION: f64 = 0.3;
const INCOHERENT_DISCOUNT: f64 = 0.8;
const REASON_DISPERSION: f64 = 0.3;
/// Floating-point noise below this is treated as perfect agreement.
const DISPERSION_EPSILON: f64 = 1e-9;

/// Normalized dispersion per component, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dispersion {
    /// Truth dispersion.
    pub truth: f64,
    /// Indeterminacy dispersion.
    pub indeterminacy: f64,
    /// Falsehood dispersion.
    pub falsehood: f64,
}

impl Dispersion {
    /// Mean of the three components.
    pub fn average(&self) -> f64 {
        (self.truth + self.indeterminacy + self.falsehood) / 3.0
    }
}

/// Agreement among judgments of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusMeasure {
    /// Consensus in [0, 1].
    pub consensus_score: f64,
    /// Per-component dispersion.
    pub dispersion: Dispersion,
    /// Per-component mean of the observations.
    pub mean: Tif,
    /// Consensus fell below the negotiation threshold.
    pub requires_negotiation: bool,
    /// Human-readable explanation of the dispersion.
    pub negotiation_reasons: Vec<String>,
    /// Number of observations measured.
    pub observations: usize,
}

/// Computes [`ConsensusMeasure`] values.
#[derive(Debug, Clone)]
pub struct ConsensusCalculator {
    negotiation_threshold: f64,
}

impl Default for ConsensusCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsensusCalculator {
    /// Default negotiation threshold is 0.7.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            negotiation_threshold: 0.7,
        }
    }

    /// Sets the consensus level below which negotiation is required.
    #[must_use]
    pub const fn with_negotiation_threshold(mut self, threshold: f64) -> Self {
        self.negotiation_threshold = threshold;
        self
    }

    /// Current negotiation threshold.
    pub fn negotiation_threshold(&self) -> f64 {
        self.negotiation_threshold
    }

    /// Measures a layer's own evaluations against each other.
    pub fn measure_layer(&self, layer: &NeutrosophicLayer) -> Result<ConsensusMeasure> {
        let observations: Vec<Tif> = layer.evaluations().iter().map(|e| e.tif).collect();
        self.measure(&observations, layer.has_creative_tension())
    }

    /// Measures agreement across the aggregates of several layers.
    pub fn measure_layers(&self, layers: &[&NeutrosophicLayer]) -> Result<ConsensusMeasure> {
        let observations: Vec<Tif> = layers.iter().filter_map(|l| l.aggregate()).collect();
        let tension = layers.iter().any(|l| l.has_creative_tension());
        self.measure(&observations, tension)
    }

    /// Measures agreement among independent observations.
    ///
    /// # Errors
    ///
    /// - [`ReciprocityError::EmptyObservations`] for an empty slice
    /// - [`ReciprocityError::InvalidThreshold`] if the negotiation threshold
    ///   is outside [0, 1]
    ///
    /// # Example
    ///
    /// ```rust
    /// use ayni_reciprocity::{ConsensusCalculator, Tif};
    ///
    /// let same = Tif::new(0.8, 0.1, 0.0)?;
    /// let measure = ConsensusCalculator::new().measure(&[same, same, same], false)?;
    /// assert_eq!(measure.consensus_score, 1.0);
    /// # Ok::<(), ayni_reciprocity::ReciprocityError>(())
    /// ```
    pub fn measure(&self, observations: &[Tif], creative_tension: bool) -> Result<ConsensusMeasure> {
        if !(0.0..=1.0).contains(&self.negotiation_threshold) {
            return Err(ReciprocityError::InvalidThreshold {
                name: "negotiation_threshold",
                value: self.negotiation_threshold,
            });
        }
        let mean = Tif::mean(observations.iter().copied())
            .ok_or(ReciprocityError::EmptyObservations)?;

        let n = observations.len() as f64;
        let spread = |component: usize| -> f64 {
            let center = mean.components()[component];
            let rms = (observations
                .iter()
                .map(|o| (o.components()[component] - center).powi(2))
                .sum::<f64>()
                / n)
                .sqrt();
            if rms < DISPERSION_EPSILON {
                0.0
            } else {
                (rms / MAX_DISPERSION).min(1.0)
            }
        };
        let dispersion = Dispersion {
            truth: spread(0),
            indeterminacy: spread(1),
            falsehood: spread(2),
        };
        let average = dispersion.average();

        let mut reasons = component_reasons(&dispersion, &mean);
        let raw = 1.0 - average;
        let consensus_score = if mean.truth() > TENSION_TRUTH
            && (TENSION_BAND.0..=TENSION_BAND.1).contains(&average)
            && creative_tension
        {
            reasons.push(format!(
                "creative tension: evaluators agree the content is reciprocal (T={:.2}) and differ on texture",
                mean.truth()
            ));
            (raw + TENSION_BOOST * average).min(1.0)
        } else if mean.truth() < INCOHERENT_TRUTH && average > INCOHERENT_DISPERSION {
            reasons.push(format!(
                "incoherent judgments: low truth (T={:.2}) with high dispersion ({:.2})",
                mean.truth(),
                average
            ));
            raw * INCOHERENT_DISCOUNT
        } else {
            raw
        };
        let consensus_score = consensus_score.clamp(0.0, 1.0);

        Ok(ConsensusMeasure {
            consensus_score,
            dispersion,
            mean,
            requires_negotiation: consensus_score < self.negotiation_threshold,
            negotiation_reasons: reasons,
            observations: observations.len(),
        })
    }
}

fn component_reasons(dispersion: &Dispersion, mean: &Tif) -> Vec<String> {
    let mut reasons = Vec::new();
    if dispersion.truth > REASON_DISPERSION {
        let detail = if mean.truth() > 0.5 {
            "evaluators agree the exchange is broadly reciprocal but not how much"
        } else {
            "evaluators disagree whether the exchange is reciprocal at all"
        };
        reasons.push(format!(
            "truth dispersion {:.2} around {:.2}: {}",
            dispersion.truth,
            mean.truth(),
            detail
        ));
    }
    if dispersion.indeterminacy > REASON_DISPERSION {
        reasons.push(format!(
            "indeterminacy dispersion {:.2} around {:.2}: evaluators disagree on how uncertain the exchange is",
            dispersion.indeterminacy,
            mean.indeterminacy()
        ));
    }
    if dispersion.falsehood > REASON_DISPERSION {
        let detail = if mean.falsehood() > 0.5 {
            "most evaluators see a violation that others miss"
        } else {
            "a minority of evaluators flag possible extraction"
        };
        reasons.push(format!(
            "falsehood dispersion {:.2} around {:.2}: {}",
            dispersion.falsehood,
            mean.falsehood(),
            detail
        ));
    }
    reasons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neutrosophic::{LayerPriority, SourceType};

    fn tif(t: f64, i: f64, f: f64) -> Tif {
        Tif::new(t, i, f).unwrap()
    }

    #[test]
    fn test_identical_observations_full_consensus() {
        let same = tif(0.8, 0.1, 0.0);
        let calc = ConsensusCalculator::new();
        let first = calc.measure(&[same, same, same], false).unwrap();

        assert_eq!(first.dispersion.truth, 0.0);
        assert_eq!(first.dispersion.indeterminacy, 0.0);
        assert_eq!(first.dispersion.falsehood, 0.0);
        assert_eq!(first.consensus_score, 1.0);
        assert!(!first.requires_negotiation);
        assert!(first.negotiation_reasons.is_empty());

        let second = calc.measure(&[same, same, same], false).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_observations_rejected() {
        assert_eq!(
            ConsensusCalculator::new().measure(&[], false),
            Err(ReciprocityError::EmptyObservations)
        );
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let calc = ConsensusCalculator::new().with_negotiation_threshold(1.5);
        assert!(matches!(
            calc.measure(&[tif(0.5, 0.5, 0.5)], false),
            Err(ReciprocityError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_dispersion_normalization() {
        // Truth 0.0 vs 1.0: rms distance 0.5, normalized to 1.0.
        let measure = ConsensusCalculator::new()
            .measure(&[tif(0.0, 0.5, 0.5), tif(1.0, 0.5, 0.5)], false)
            .unwrap();
        assert!((measure.dispersion.truth - 1.0).abs() < 1e-9);
        assert_eq!(measure.dispersion.falsehood, 0.0);
        assert!((measure.consensus_score - (1.0 - 1.0 / 3.0)).abs() < 1e-9);
        assert!(measure.requires_negotiation);
        assert!(measure.negotiation_reasons[0].contains("truth dispersion"));
    }

    #[test]
    fn test_creative_tension_boosts_consensus() {
        // Truth spread with high mean: average dispersion lands in the band.
        let observations = [tif(0.95, 0.1, 0.0), tif(0.6, 0.1, 0.0), tif(0.95, 0.4, 0.2)];
        let calc = ConsensusCalculator::new();
        let plain = calc.measure(&observations, false).unwrap();
        let tense = calc.measure(&observations, true).unwrap();

        let avg = plain.dispersion.average();
        assert!((0.1..=0.3).contains(&avg), "average dispersion {}", avg);
        assert!(tense.consensus_score > plain.consensus_score);
        assert!((tense.consensus_score - (plain.consensus_score + 0.5 * avg)).abs() < 1e-9);
    }

    #[test]
    fn test_incoherence_discount() {
        let observations = [tif(0.0, 0.0, 1.0), tif(0.6, 1.0, 0.0)];
        let measure = ConsensusCalculator::new().measure(&observations, false).unwrap();
        let raw = 1.0 - measure.dispersion.average();
        assert!(measure.dispersion.average() > 0.3);
        assert!((measure.consensus_score - raw * 0.8).abs() < 1e-9);
        assert!(measure
            .negotiation_reasons
            .iter()
            .any(|r| r.contains("incoherent")));
    }

    #[test]
    fn test_measure_layer_uses_creative_tension() {
        let mut layer = NeutrosophicLayer::new("content", LayerPriority::User);
        layer.add_evaluation(tif(1.0, 0.1, 0.0), SourceType::Observer);
        layer.add_evaluation(tif(0.55, 0.1, 0.0), SourceType::Observer);
        layer.add_evaluation(tif(1.0, 0.3, 0.1), SourceType::Observer);
        assert!(layer.has_creative_tension());

        let measure = ConsensusCalculator::new().measure_layer(&layer).unwrap();
        assert_eq!(measure.observations, 3);
        assert!(measure
            .negotiation_reasons
            .iter()
            .any(|r| r.contains("creative tension")));
    }

    #[test]
    fn test_measure_layers_skips_unevaluated() {
        let mut a = NeutrosophicLayer::new("a", LayerPriority::System);
        a.add_evaluation(tif(0.8, 0.1, 0.0), SourceType::Semantic);
        let b = NeutrosophicLayer::new("b", LayerPriority::User);

        let measure = ConsensusCalculator::new().measure_layers(&[&a, &b]).unwrap();
        assert_eq!(measure.observations, 1);
        assert_eq!(measure.consensus_score, 1.0);
    }
}
