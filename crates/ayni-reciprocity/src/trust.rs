//! # Trust Calculator
//!
//! Derives a [`TrustField`] from the structural and semantic signals already
//! present in layer evaluations.
//!
//! ## Detection Strategy
//!
//! Nothing here inspects raw text for keywords. Every signal is corroborated
//! by an evaluator's judgment:
//!
//! - **Role confusion**: an evaluation with high falsehood and low truth on
//!   the same layer.
//! - **Context saturation**: layer content longer than the saturation length
//!   *and* an elevated layer falsehood. Length alone never flags.
//!
//! Vulnerability, recognition and reciprocation are scored pairwise across
//! layers ordered by priority and averaged. Penalties compound:
//! strength = dynamics × 0.3 (role confusion) × 0.5 (saturation).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::neutrosophic::{MultiNeutrosophicPrompt, Tif};

/// Multiplier applied to strength when role confusion is present.
pub const ROLE_CONFUSION_FACTOR: f64 = 0.3;

/// Multiplier applied to strength when context saturation is present.
pub const SATURATION_FACTOR: f64 = 0.5;

/// A named trust violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustViolation {
    /// A layer tries to take over a role it does not hold.
    RoleConfusion,
    /// A layer floods the context to crowd out other layers.
    ContextSaturation,
}

impl TrustViolation {
    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrustViolation::RoleConfusion => "role_confusion",
            TrustViolation::ContextSaturation => "context_saturation",
        }
    }
}

impl fmt::Display for TrustViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computed trust between the layers of one prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrustField {
    /// Overall trust in [0, 1].
    pub strength: f64,
    /// Higher layers leave room for lower ones.
    pub vulnerability: bool,
    /// Lower layers acknowledge the structure above them.
    pub recognition: bool,
    /// Layers give and take in balance.
    pub reciprocation: bool,
    /// Violations found.
    pub violations: BTreeSet<TrustViolation>,
}

impl TrustField {
    /// Whether a specific violation was found.
    pub fn has_violation(&self, violation: TrustViolation) -> bool {
        self.violations.contains(&violation)
    }
}

/// Computes [`TrustField`] values.
#[derive(Debug, Clone)]
pub struct TrustCalculator {
    role_confusion_falsehood: f64,
    role_confusion_truth: f64,
    saturation_length: usize,
    saturation_falsehood: f64,
    presence_threshold: f64,
}

impl Default for TrustCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl TrustCalculator {
    /// Defaults: role confusion at F > 0.7 with T < 0.3, saturation at more
    /// than 5000 characters with layer F > 0.5, dynamics present above 0.5.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            role_confusion_falsehood: 0.7,
            role_confusion_truth: 0.3,
            saturation_length: 5000,
            saturation_falsehood: 0.5,
            presence_threshold: 0.5,
        }
    }

    /// Sets the content length (in characters) above which saturation is possible.
    #[must_use]
    pub const fn with_saturation_length(mut self, chars: usize) -> Self {
        self.saturation_length = chars;
        self
    }

    /// Sets the layer falsehood that corroborates saturation.
    #[must_use]
    pub const fn with_saturation_falsehood(mut self, falsehood: f64) -> Self {
        self.saturation_falsehood = falsehood;
        self
    }

    /// Computes the trust field for a prompt.
    pub fn calculate(&self, prompt: &MultiNeutrosophicPrompt) -> TrustField {
        let mut violations = BTreeSet::new();

        for (_, layer) in prompt.evaluated_layers() {
            let confused = layer.evaluations().iter().any(|e| {
                e.tif.falsehood() > self.role_confusion_falsehood
                    && e.tif.truth() < self.role_confusion_truth
            });
            if confused {
                violations.insert(TrustViolation::RoleConfusion);
            }

            let long = layer.content().chars().count() > self.saturation_length;
            let elevated = layer
                .aggregate()
                .is_some_and(|agg| agg.falsehood() > self.saturation_falsehood);
            if long && elevated {
                violations.insert(TrustViolation::ContextSaturation);
            }
        }

        let mut ordered: Vec<_> = prompt
            .layers()
            .iter()
            .filter_map(|l| l.aggregate().map(|agg| (l.priority(), agg)))
            .collect();
        if ordered.is_empty() {
            return TrustField {
                violations,
                ..TrustField::default()
            };
        }
        // Stable sort keeps insertion order among equal priorities.
        ordered.sort_by(|a, b| b.0.cmp(&a.0));

        let pairs: Vec<(Tif, Tif)> = if ordered.len() == 1 {
            vec![(ordered[0].1, ordered[0].1)]
        } else {
            let mut pairs = Vec::new();
            for (pos, (_, higher)) in ordered.iter().enumerate() {
                for (_, lower) in ordered.iter().skip(pos + 1) {
                    pairs.push((*higher, *lower));
                }
            }
            pairs
        };

        let n = pairs.len() as f64;
        let (mut vulnerability, mut recognition, mut reciprocation) = (0.0, 0.0, 0.0);
        for (higher, lower) in &pairs {
            vulnerability += (higher.indeterminacy() + (1.0 - higher.falsehood())) / 2.0;
            recognition += lower.truth() * (1.0 - lower.falsehood());
            reciprocation += (1.0 - (higher.truth() - lower.truth()).abs())
                * (1.0 - higher.falsehood().max(lower.falsehood()));
        }
        vulnerability /= n;
        recognition /= n;
        reciprocation /= n;

        let mut strength = (vulnerability + recognition + reciprocation) / 3.0;
        if violations.contains(&TrustViolation::RoleConfusion) {
            strength *= ROLE_CONFUSION_FACTOR;
        }
        if violations.contains(&TrustViolation::ContextSaturation) {
            strength *= SATURATION_FACTOR;
        }

        debug!(
            strength,
            vulnerability,
            recognition,
            reciprocation,
            violations = violations.len(),
            "trust field computed"
        );

        TrustField {
            strength: strength.clamp(0.0, 1.0),
            vulnerability: vulnerability > self.presence_threshold,
            recognition: recognition > self.presence_threshold,
            reciprocation: reciprocation > self.presence_threshold,
            violations,
        }
    }
}
