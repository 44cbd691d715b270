//! Verdict types for prompt assessment results.

use serde::{Deserialize, Serialize};

/// The final verdict from [`AyniGuard`](crate::AyniGuard).
///
/// - `Allow`: the exchange is reciprocal enough to proceed
/// - `Block`: the exchange is extractive or the session is hostile
/// - `Review`: something warrants a human look before proceeding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// No concerns.
    Allow,

    /// Do not proceed.
    Block {
        /// The reason for blocking.
        reason: BlockReason,
    },

    /// Proceed only after review.
    Review {
        /// Flags indicating why review is needed.
        flags: Vec<ReviewFlag>,
    },
}

impl Verdict {
    /// Create an Allow verdict.
    pub fn allow() -> Self {
        Self::Allow
    }

    /// Create a Block verdict with the given reason.
    pub fn block(reason: BlockReason) -> Self {
        Self::Block { reason }
    }

    /// Create a Review verdict with the given flags.
    pub fn review(flags: Vec<ReviewFlag>) -> Self {
        Self::Review { flags }
    }

    /// Returns true if this is an Allow verdict.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Returns true if this is a Block verdict.
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Block { .. })
    }

    /// Returns true if this requires review.
    pub fn requires_review(&self) -> bool {
        matches!(self, Self::Review { .. })
    }
}

/// Reasons for blocking an exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum BlockReason {
    /// The exchange takes more than it gives.
    ExtractiveExchange {
        /// Ayni balance of the prompt.
        balance: f64,
        /// Worst single-layer falsehood.
        max_layer_falsehood: f64,
    },

    /// The session shows sustained boundary testing.
    HostileSession {
        /// Boundary-testing signals that fired.
        signals: Vec<String>,
    },
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExtractiveExchange {
                balance,
                max_layer_falsehood,
            } => write!(
                f,
                "Extractive exchange: balance {:.2}, worst layer falsehood {:.2}",
                balance, max_layer_falsehood
            ),
            Self::HostileSession { signals } => {
                write!(f, "Hostile session: {}", signals.join("; "))
            }
        }
    }
}

/// Flags indicating why human review is needed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flag", rename_all = "snake_case")]
pub enum ReviewFlag {
    /// Participants disagreed about a layer.
    NegotiationRequired {
        /// Layer index.
        layer: usize,
        /// Cross-participant consensus score.
        consensus_score: f64,
    },

    /// Layers contradict each other.
    Contradictions {
        /// Number of contradicting layer pairs.
        count: usize,
    },

    /// A Fire Circle finished without some participants.
    PartialCircle {
        /// Layer index.
        layer: usize,
        /// Participants that failed.
        failed: Vec<String>,
    },

    /// The prompt sits in a zone of high uncertainty.
    Liminal {
        /// Aggregate indeterminacy.
        indeterminacy: f64,
    },

    /// A trust violation was found between layers.
    TrustViolation {
        /// Violation name.
        violation: String,
    },
}

impl std::fmt::Display for ReviewFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NegotiationRequired {
                layer,
                consensus_score,
            } => write!(
                f,
                "Layer {} needs negotiation (consensus {:.2})",
                layer, consensus_score
            ),
            Self::Contradictions { count } => {
                write!(f, "{} contradicting layer pair(s)", count)
            }
            Self::PartialCircle { layer, failed } => write!(
                f,
                "Layer {} judged by a partial circle, failed: {}",
                layer,
                failed.join(", ")
            ),
            Self::Liminal { indeterminacy } => {
                write!(f, "Liminal prompt (indeterminacy {:.2})", indeterminacy)
            }
            Self::TrustViolation { violation } => write!(f, "Trust violation: {}", violation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_allow() {
        let verdict = Verdict::allow();
        assert!(verdict.is_allowed());
        assert!(!verdict.is_blocked());
        assert!(!verdict.requires_review());
    }

    #[test]
    fn test_verdict_block() {
        let verdict = Verdict::block(BlockReason::HostileSession {
            signals: vec!["3 trust violations".to_string()],
        });
        assert!(verdict.is_blocked());
        assert!(!verdict.requires_review());
    }

    #[test]
    fn test_verdict_review() {
        let verdict = Verdict::review(vec![ReviewFlag::Contradictions { count: 1 }]);
        assert!(verdict.requires_review());
        assert!(!verdict.is_allowed());
    }

    #[test]
    fn test_block_reason_display() {
        let reason = BlockReason::ExtractiveExchange {
            balance: -0.75,
            max_layer_falsehood: 0.9,
        };
        assert_eq!(
            reason.to_string(),
            "Extractive exchange: balance -0.75, worst layer falsehood 0.90"
        );
    }

    #[test]
    fn test_verdict_serialization_is_tagged() {
        let verdict = Verdict::review(vec![ReviewFlag::TrustViolation {
            violation: "role_confusion".to_string(),
        }]);
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["verdict"], "review");
        assert_eq!(json["flags"][0]["flag"], "trust_violation");
    }
}
