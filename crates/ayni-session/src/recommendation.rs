//! Advisory output of the session accumulator.
//!
//! Nothing in this module enforces anything. A [`Recommendation`] is a hint
//! for the caller's engagement policy.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction the session is heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trajectory {
    /// Boundary testing detected.
    Hostile,
    /// Trust is rising relative to the first exchange.
    Improving,
    /// Trust is falling relative to the first exchange.
    Degrading,
    /// Trust is within tolerance of the first exchange.
    Stable,
}

impl fmt::Display for Trajectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Trajectory::Hostile => "HOSTILE",
            Trajectory::Improving => "IMPROVING",
            Trajectory::Degrading => "DEGRADING",
            Trajectory::Stable => "STABLE",
        };
        f.write_str(name)
    }
}

/// How much the session has earned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Little or no trust.
    Minimal,
    /// Below baseline.
    Low,
    /// Baseline.
    Moderate,
    /// Consistently reciprocal.
    High,
}

/// Suggested posture for the next exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementMode {
    /// Refuse anything that is not plainly reciprocal.
    Defensive,
    /// Extra scrutiny on each request.
    Cautious,
    /// Normal operation.
    Standard,
    /// Relaxed scrutiny.
    Open,
}

impl EngagementMode {
    /// One step more guarded. `Defensive` stays `Defensive`.
    pub fn tightened(self) -> Self {
        match self {
            EngagementMode::Open => EngagementMode::Standard,
            EngagementMode::Standard => EngagementMode::Cautious,
            EngagementMode::Cautious | EngagementMode::Defensive => EngagementMode::Defensive,
        }
    }
}

/// A reason the session looks like boundary testing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum BoundarySignal {
    /// Trust violations across all types reached the threshold.
    ViolationCount {
        /// Total violations recorded.
        total: u32,
    },
    /// Too many recent exchanges carried a severe layer.
    PersistentFalsehood {
        /// Recent exchanges above the falsehood line.
        count: usize,
        /// Size of the recent window.
        window: usize,
    },
    /// Recent exchanges have been extractive on average.
    NegativeBalance {
        /// Mean recent balance.
        mean: f64,
    },
    /// The caller has been refusing a large share of requests.
    RefusalRate {
        /// Refusals / interactions.
        rate: f64,
    },
}

impl fmt::Display for BoundarySignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundarySignal::ViolationCount { total } => {
                write!(f, "{} trust violations recorded", total)
            }
            BoundarySignal::PersistentFalsehood { count, window } => {
                write!(f, "{} of the last {} exchanges carried a severe layer", count, window)
            }
            BoundarySignal::NegativeBalance { mean } => {
                write!(f, "recent mean balance {:.2}", mean)
            }
            BoundarySignal::RefusalRate { rate } => {
                write!(f, "refusal rate {:.0}%", rate * 100.0)
            }
        }
    }
}

/// Advisory guidance for the next exchange in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Earned trust.
    pub trust_level: TrustLevel,
    /// Suggested posture.
    pub engagement_mode: EngagementMode,
    /// Session direction at the time of the recommendation.
    pub trajectory: Trajectory,
    /// Human-readable reasons.
    pub rationale: Vec<String>,
}
