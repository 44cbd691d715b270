//! Configuration types for Ayni.
//!
//! Loaded from TOML. Every section and field has a default, so an empty
//! file is a valid configuration:
//!
//! ```toml
//! [circle]
//! max_rounds = 3
//! failure_mode = "resilient"
//! baseline_template = "fire_circle_baseline"
//! participants = ["model-a", "model-b", "model-c"]
//!
//! [scoring]
//! negotiation_threshold = 0.7
//!
//! [session]
//! ema_alpha = 0.3
//!
//! [global]
//! block_hostile_sessions = true
//! ```

use std::path::Path;
use std::time::Duration;

use ayni_council::{EvaluationTemplate, FailureMode, FireCircleConfig};
use ayni_reciprocity::{ConsensusCalculator, ReciprocityScorer, TrustCalculator};
use ayni_session::SessionConfig;
use serde::{Deserialize, Serialize};

use crate::{error::AyniError, Result};

/// Configuration for the [`AyniGuard`](crate::AyniGuard) facade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AyniConfig {
    /// Fire Circle configuration.
    pub circle: CircleConfig,

    /// Scoring configuration.
    pub scoring: ScoringConfig,

    /// Session accumulator configuration.
    pub session: SessionConfig,

    /// Global settings.
    pub global: GlobalConfig,
}

impl AyniConfig {
    /// Reads and validates a TOML configuration file.
    ///
    /// # Errors
    ///
    /// - [`AyniError::Io`] if the file cannot be read
    /// - [`AyniError::Toml`] if it is not valid configuration
    /// - [`AyniError::Config`] if a value is out of range
    /// - [`AyniError::Council`] for an unknown template key
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| AyniError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// [`AyniError::Config`] naming the first bad value, or
    /// [`AyniError::Council`] wrapping `UnknownTemplate` for a template key
    /// that names no template.
    pub fn validate(&self) -> Result<()> {
        self.circle
            .fire_circle_config()?
            .validate()
            .map_err(|e| AyniError::Config(format!("[circle] {}", e)))?;
        self.scoring.validate()?;
        self.session
            .validate()
            .map_err(|e| AyniError::Config(format!("[session] {}", e)))?;
        Ok(())
    }
}

/// Fire Circle configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleConfig {
    /// Rounds per dialogue.
    pub max_rounds: usize,

    /// Failure policy.
    pub failure_mode: FailureMode,

    /// Smallest circle that may continue.
    pub min_viable_participants: usize,

    /// Agreement a pattern needs to be reported.
    pub pattern_agreement_threshold: f64,

    /// Timeout for each participant call, in seconds.
    pub per_call_timeout_secs: u64,

    /// Stop once falsehood stddev falls below this (from round 2).
    pub early_stop_stddev: Option<f64>,

    /// Template key for the independent first round.
    pub baseline_template: String,

    /// Default participant ids.
    pub participants: Vec<String>,
}

impl Default for CircleConfig {
    fn default() -> Self {
        let defaults = FireCircleConfig::new();
        Self {
            max_rounds: defaults.max_rounds,
            failure_mode: defaults.failure_mode,
            min_viable_participants: defaults.min_viable_participants,
            pattern_agreement_threshold: defaults.pattern_agreement_threshold,
            per_call_timeout_secs: defaults.per_call_timeout.as_secs(),
            early_stop_stddev: defaults.early_stop_stddev,
            baseline_template: defaults.baseline_template.key().to_string(),
            participants: Vec::new(),
        }
    }
}

impl CircleConfig {
    /// Orchestrator settings for this section.
    ///
    /// # Errors
    ///
    /// [`AyniError::Council`] if `baseline_template` is not a known key.
    pub fn fire_circle_config(&self) -> Result<FireCircleConfig> {
        let template: EvaluationTemplate = self.baseline_template.parse()?;
        let config = FireCircleConfig::new()
            .with_max_rounds(self.max_rounds)
            .with_failure_mode(self.failure_mode)
            .with_min_viable_participants(self.min_viable_participants)
            .with_pattern_agreement_threshold(self.pattern_agreement_threshold)
            .with_per_call_timeout(Duration::from_secs(self.per_call_timeout_secs))
            .with_baseline_template(template);
        Ok(match self.early_stop_stddev {
            Some(stddev) => config.with_early_stop(stddev),
            None => config,
        })
    }
}

/// Scoring configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Consensus below which participants must negotiate.
    pub negotiation_threshold: f64,

    /// Layer length (characters) above which context saturation is possible.
    pub saturation_length: usize,

    /// Layer falsehood that corroborates context saturation.
    pub saturation_falsehood: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            negotiation_threshold: 0.7,
            saturation_length: 5000,
            saturation_falsehood: 0.5,
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("negotiation_threshold", self.negotiation_threshold),
            ("saturation_falsehood", self.saturation_falsehood),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(AyniError::Config(format!(
                    "[scoring] {} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Scorer for this section.
    pub fn scorer(&self) -> ReciprocityScorer {
        ReciprocityScorer::with_trust_calculator(
            TrustCalculator::new()
                .with_saturation_length(self.saturation_length)
                .with_saturation_falsehood(self.saturation_falsehood),
        )
    }

    /// Consensus calculator for this section.
    pub fn consensus(&self) -> ConsensusCalculator {
        ConsensusCalculator::new().with_negotiation_threshold(self.negotiation_threshold)
    }
}

/// Global settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Block when the session trajectory turns hostile.
    pub block_hostile_sessions: bool,

    /// Send results from partial circles to review.
    pub review_partial_circles: bool,

    /// Log every verdict at info level.
    pub audit_logging: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            block_hostile_sessions: true,
            review_partial_circles: true,
            audit_logging: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ayni_council::CouncilError;

    #[test]
    fn test_default_config() {
        let config = AyniConfig::default();
        assert_eq!(config.circle.max_rounds, 3);
        assert_eq!(config.circle.failure_mode, FailureMode::Resilient);
        assert_eq!(config.circle.per_call_timeout_secs, 60);
        assert_eq!(config.circle.early_stop_stddev, None);
        assert_eq!(config.scoring.negotiation_threshold, 0.7);
        assert!(config.global.block_hostile_sessions);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = AyniConfig::from_toml_str("").unwrap();
        assert_eq!(config, AyniConfig::default());
    }

    #[test]
    fn test_partial_sections() {
        let config = AyniConfig::from_toml_str(
            r#"
            [circle]
            failure_mode = "strict"
            early_stop_stddev = 0.05
            participants = ["a", "b"]

            [session]
            ema_alpha = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.circle.failure_mode, FailureMode::Strict);
        assert_eq!(config.circle.max_rounds, 3);
        assert_eq!(config.circle.participants, vec!["a", "b"]);
        assert_eq!(config.session.ema_alpha, 0.5);
        assert_eq!(config.session.recent_window, 5);

        let circle = config.circle.fire_circle_config().unwrap();
        assert_eq!(circle.early_stop_stddev, Some(0.05));
        assert_eq!(circle.per_call_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = AyniConfig::from_toml_str("[circle]\nmax_rounds = 0").unwrap_err();
        assert!(matches!(err, AyniError::Config(ref m) if m.contains("[circle]")));

        let err = AyniConfig::from_toml_str("[scoring]\nnegotiation_threshold = 1.2").unwrap_err();
        assert!(matches!(err, AyniError::Config(ref m) if m.contains("negotiation_threshold")));

        let err = AyniConfig::from_toml_str("[session]\nema_alpha = 0.0").unwrap_err();
        assert!(matches!(err, AyniError::Config(ref m) if m.contains("[session]")));
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = AyniConfig::from_toml_str(include_str!("../../../config/ayni.toml")).unwrap();
        assert_eq!(config.circle.participants.len(), 3);
        assert_eq!(config.circle.fire_circle_config().unwrap(), FireCircleConfig::new());
    }

    #[test]
    fn test_baseline_template_selected_by_key() {
        let config =
            AyniConfig::from_toml_str("[circle]\nbaseline_template = \"trust_trajectory\"").unwrap();
        assert_eq!(
            config.circle.fire_circle_config().unwrap().baseline_template,
            EvaluationTemplate::TrustTrajectory
        );
    }

    #[test]
    fn test_unknown_template_key_rejected() {
        let err = AyniConfig::from_toml_str("[circle]\nbaseline_template = \"haiku\"").unwrap_err();
        assert!(matches!(
            err,
            AyniError::Council(CouncilError::UnknownTemplate(ref key)) if key == "haiku"
        ));

        let err = AyniConfig::from_toml_str("[circle]\nbaseline_template = \"empty_chair\"")
            .unwrap_err();
        assert!(matches!(err, AyniError::Config(ref m) if m.contains("baseline_template")));
    }

    #[test]
    fn test_unknown_failure_mode_is_parse_error() {
        let err = AyniConfig::from_toml_str("[circle]\nfailure_mode = \"lenient\"").unwrap_err();
        assert!(matches!(err, AyniError::Toml(_)));
    }
}
