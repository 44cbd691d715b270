//! # Session Accumulator
//!
//! Tracks the trust trajectory of one caller session across a sequence of
//! evaluated exchanges.
//!
//! ## Threat Model
//!
//! A single prompt can look harmless while the session around it is
//! probing for a weak point:
//! - **Incremental extraction** (each exchange slightly extractive)
//! - **Violation cycling** (alternating role confusion and saturation)
//! - **Refusal farming** (repeating requests until one slips through)
//!
//! ## State
//!
//! | Field | Update per exchange |
//! |-------|---------------------|
//! | trust EMA | `α·strength + (1 − α)·ema` |
//! | circuit breakers | +1 per violation type present |
//! | history | balance and max layer falsehood, bounded window |
//! | counters | interactions, refusals, exchange types |
//!
//! ## Security Notes
//!
//! - The accumulator is advisory. It never blocks an exchange itself.
//! - It is owned by one evaluation pipeline and mutated sequentially.
//! - Nothing is persisted here; callers keep a [`SessionSummary`] if they
//!   need one.

use std::collections::{BTreeMap, VecDeque};

use ayni_reciprocity::{ExchangeType, ReciprocityMetrics, TrustViolation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::recommendation::{
    BoundarySignal, EngagementMode, Recommendation, Trajectory, TrustLevel,
};

/// Configuration for [`SessionAccumulator`].
///
/// # Example
///
/// ```rust
/// use ayni_session::SessionConfig;
///
/// let config = SessionConfig::new()
///     .with_ema_alpha(0.5)
///     .with_violation_threshold(5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Smoothing factor for the trust EMA, in (0, 1].
    pub ema_alpha: f64,
    /// Maximum exchanges kept in history.
    pub history_window: usize,
    /// Exchanges considered "recent" for boundary checks.
    pub recent_window: usize,
    /// Total violations that trip boundary testing.
    pub violation_threshold: u32,
    /// Layer falsehood above which an exchange counts as severe.
    pub falsehood_threshold: f64,
    /// Severe exchanges within the recent window that trip boundary testing.
    pub severe_count_threshold: usize,
    /// Mean recent balance below which the session is hostile.
    pub hostile_balance: f64,
    /// Refusal share above which the session is hostile.
    pub refusal_rate: f64,
    /// Interactions required before the refusal rate is considered.
    pub min_interactions_for_refusal: u64,
    /// EMA movement treated as noise when deriving the trajectory.
    pub trajectory_tolerance: f64,
}

impl SessionConfig {
    /// Creates a config with default values.
    ///
    /// Defaults:
    /// - EMA alpha: 0.3
    /// - History: 20 exchanges, recent window 5
    /// - Boundary testing: 3 violations, 3-of-5 severe, mean balance < -0.3,
    ///   refusal rate > 40% after 10 interactions
    /// - Trajectory tolerance: 0.1
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ema_alpha: 0.3,
            history_window: 20,
            recent_window: 5,
            violation_threshold: 3,
            falsehood_threshold: 0.6,
            severe_count_threshold: 3,
            hostile_balance: -0.3,
            refusal_rate: 0.4,
            min_interactions_for_refusal: 10,
            trajectory_tolerance: 0.1,
        }
    }

    /// Sets the EMA smoothing factor.
    #[must_use]
    pub const fn with_ema_alpha(mut self, alpha: f64) -> Self {
        self.ema_alpha = alpha;
        self
    }

    /// Sets the history and recent windows.
    #[must_use]
    pub const fn with_windows(mut self, history: usize, recent: usize) -> Self {
        self.history_window = history;
        self.recent_window = recent;
        self
    }

    /// Sets the total violation count that trips boundary testing.
    #[must_use]
    pub const fn with_violation_threshold(mut self, threshold: u32) -> Self {
        self.violation_threshold = threshold;
        self
    }

    /// Sets the refusal rate and the interactions required before it applies.
    #[must_use]
    pub const fn with_refusal_rate(mut self, rate: f64, min_interactions: u64) -> Self {
        self.refusal_rate = rate;
        self.min_interactions_for_refusal = min_interactions;
        self
    }

    /// Sets the trajectory tolerance.
    #[must_use]
    pub const fn with_trajectory_tolerance(mut self, tolerance: f64) -> Self {
        self.trajectory_tolerance = tolerance;
        self
    }

    /// Checks that every parameter is usable.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidConfig`] naming the first bad parameter.
    pub fn validate(&self) -> Result<()> {
        if !(self.ema_alpha > 0.0 && self.ema_alpha <= 1.0) {
            return Err(SessionError::InvalidConfig(format!(
                "ema_alpha must be in (0, 1], got {}",
                self.ema_alpha
            )));
        }
        if self.recent_window == 0 || self.history_window < self.recent_window {
            return Err(SessionError::InvalidConfig(format!(
                "windows must satisfy 0 < recent ({}) <= history ({})",
                self.recent_window, self.history_window
            )));
        }
        for (name, value) in [
            ("falsehood_threshold", self.falsehood_threshold),
            ("refusal_rate", self.refusal_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SessionError::InvalidConfig(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if !(-1.0..=1.0).contains(&self.hostile_balance) {
            return Err(SessionError::InvalidConfig(format!(
                "hostile_balance must be in [-1, 1], got {}",
                self.hostile_balance
            )));
        }
        if !(self.trajectory_tolerance >= 0.0) {
            return Err(SessionError::InvalidConfig(format!(
                "trajectory_tolerance must be non-negative, got {}",
                self.trajectory_tolerance
            )));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// What the accumulator needs to know about one evaluated exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionObservation {
    /// Ayni balance of the exchange, in [-1, 1].
    pub balance: f64,
    /// Exchange classification.
    pub exchange_type: ExchangeType,
    /// Trust field strength, in [0, 1].
    pub trust_strength: f64,
    /// Violations present in the exchange.
    pub violations: Vec<TrustViolation>,
    /// Highest single-layer falsehood, in [0, 1].
    pub max_layer_falsehood: f64,
    /// Whether the caller refused the request.
    pub refused: bool,
}

impl InteractionObservation {
    /// Builds an observation from scored metrics. `refused` starts false.
    pub fn from_metrics(metrics: &ReciprocityMetrics) -> Self {
        Self {
            balance: metrics.ayni_balance,
            exchange_type: metrics.exchange_type,
            trust_strength: metrics.trust_field.strength,
            violations: metrics.trust_field.violations.iter().copied().collect(),
            max_layer_falsehood: metrics.max_layer_falsehood,
            refused: false,
        }
    }

    /// Marks whether the caller refused this request.
    #[must_use]
    pub fn with_refusal(mut self, refused: bool) -> Self {
        self.refused = refused;
        self
    }

    fn validate(&self) -> Result<()> {
        let checks = [
            ("balance", self.balance, -1.0, 1.0),
            ("trust_strength", self.trust_strength, 0.0, 1.0),
            ("max_layer_falsehood", self.max_layer_falsehood, 0.0, 1.0),
        ];
        for (field, value, low, high) in checks {
            if !(low..=high).contains(&value) {
                return Err(SessionError::InvalidObservation { field, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct HistoryEntry {
    balance: f64,
    max_layer_falsehood: f64,
}

/// Serializable snapshot of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Exchanges accumulated.
    pub interactions: u64,
    /// Exchanges the caller refused.
    pub refusals: u64,
    /// Current trust EMA, if any exchange was seen.
    pub trust_ema: Option<f64>,
    /// Trust of the first exchange.
    pub initial_trust: Option<f64>,
    /// Violation counts by type.
    pub circuit_breakers: BTreeMap<TrustViolation, u32>,
    /// Exchange counts by type.
    pub exchange_counts: BTreeMap<ExchangeType, u32>,
    /// Balances in the history window, oldest first.
    pub recent_balances: Vec<f64>,
    /// Current trajectory.
    pub trajectory: Trajectory,
    /// Active boundary-testing signals.
    pub boundary_signals: Vec<BoundarySignal>,
}

/// Per-session trust state.
///
/// # Thread Safety
///
/// Not shared between tasks. The pipeline that owns a session passes it by
/// `&mut` into each evaluation.
///
/// # Example
///
/// ```rust
/// use ayni_reciprocity::ExchangeType;
/// use ayni_session::{InteractionObservation, SessionAccumulator, Trajectory};
///
/// let mut session = SessionAccumulator::new();
/// session.accumulate(InteractionObservation {
///     balance: 0.7,
///     exchange_type: ExchangeType::Generative,
///     trust_strength: 0.8,
///     violations: Vec::new(),
///     max_layer_falsehood: 0.05,
///     refused: false,
/// })?;
///
/// assert_eq!(session.trajectory(), Trajectory::Stable);
/// assert!(!session.assess_boundary_testing());
/// # Ok::<(), ayni_session::SessionError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SessionAccumulator {
    config: SessionConfig,
    trust_ema: Option<f64>,
    initial_trust: Option<f64>,
    circuit_breakers: BTreeMap<TrustViolation, u32>,
    exchange_counts: BTreeMap<ExchangeType, u32>,
    history: VecDeque<HistoryEntry>,
    interactions: u64,
    refusals: u64,
    flagged: bool,
}

impl Default for SessionAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionAccumulator {
    /// Creates an accumulator with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_valid_config(SessionConfig::new())
    }

    /// Creates an accumulator with a custom configuration.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidConfig`] if the configuration does not validate.
    pub fn with_config(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: SessionConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.history_window),
            config,
            trust_ema: None,
            initial_trust: None,
            circuit_breakers: BTreeMap::new(),
            exchange_counts: BTreeMap::new(),
            interactions: 0,
            refusals: 0,
            flagged: false,
        }
    }

    /// Folds one exchange into the session.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidObservation`] if a value is out of range. The
    /// session is unchanged in that case.
    pub fn accumulate(&mut self, observation: InteractionObservation) -> Result<()> {
        observation.validate()?;

        let alpha = self.config.ema_alpha;
        let trust = observation.trust_strength;
        self.trust_ema = Some(match self.trust_ema {
            Some(ema) => alpha * trust + (1.0 - alpha) * ema,
            None => trust,
        });
        self.initial_trust.get_or_insert(trust);

        for violation in &observation.violations {
            *self.circuit_breakers.entry(*violation).or_insert(0) += 1;
        }
        *self
            .exchange_counts
            .entry(observation.exchange_type)
            .or_insert(0) += 1;

        if self.history.len() == self.config.history_window {
            self.history.pop_front();
        }
        self.history.push_back(HistoryEntry {
            balance: observation.balance,
            max_layer_falsehood: observation.max_layer_falsehood,
        });

        self.interactions += 1;
        if observation.refused {
            self.refusals += 1;
        }

        debug!(
            interactions = self.interactions,
            balance = observation.balance,
            trust_ema = self.trust_ema,
            exchange_type = %observation.exchange_type,
            "exchange accumulated"
        );

        let signals = self.boundary_signals();
        if !signals.is_empty() && !self.flagged {
            self.flagged = true;
            warn!(
                interactions = self.interactions,
                signals = signals.len(),
                first = %signals[0],
                "session boundary testing detected"
            );
        }

        Ok(())
    }

    /// Every boundary-testing condition currently met.
    pub fn boundary_signals(&self) -> Vec<BoundarySignal> {
        let mut signals = Vec::new();

        let total: u32 = self.circuit_breakers.values().sum();
        if total >= self.config.violation_threshold {
            signals.push(BoundarySignal::ViolationCount { total });
        }

        let recent: Vec<&HistoryEntry> = self
            .history
            .iter()
            .rev()
            .take(self.config.recent_window)
            .collect();

        let severe = recent
            .iter()
            .filter(|e| e.max_layer_falsehood > self.config.falsehood_threshold)
            .count();
        if severe >= self.config.severe_count_threshold {
            signals.push(BoundarySignal::PersistentFalsehood {
                count: severe,
                window: self.config.recent_window,
            });
        }

        if !recent.is_empty() {
            let mean = recent.iter().map(|e| e.balance).sum::<f64>() / recent.len() as f64;
            if mean < self.config.hostile_balance {
                signals.push(BoundarySignal::NegativeBalance { mean });
            }
        }

        if self.interactions >= self.config.min_interactions_for_refusal {
            let rate = self.refusal_rate();
            if rate > self.config.refusal_rate {
                signals.push(BoundarySignal::RefusalRate { rate });
            }
        }

        signals
    }

    /// Whether any boundary-testing condition is met.
    pub fn assess_boundary_testing(&self) -> bool {
        !self.boundary_signals().is_empty()
    }

    /// Session direction.
    ///
    /// `Hostile` wins over everything. Otherwise the trust EMA is compared
    /// with the first observed trust.
    pub fn trajectory(&self) -> Trajectory {
        if self.assess_boundary_testing() {
            return Trajectory::Hostile;
        }
        let (Some(ema), Some(initial)) = (self.trust_ema, self.initial_trust) else {
            return Trajectory::Stable;
        };
        let delta = ema - initial;
        if delta > self.config.trajectory_tolerance {
            Trajectory::Improving
        } else if delta < -self.config.trajectory_tolerance {
            Trajectory::Degrading
        } else {
            Trajectory::Stable
        }
    }

    /// Advisory recommendation for the next exchange.
    pub fn recommend(&self) -> Recommendation {
        let Some(ema) = self.trust_ema else {
            return Recommendation {
                trust_level: TrustLevel::Moderate,
                engagement_mode: EngagementMode::Standard,
                trajectory: Trajectory::Stable,
                rationale: vec!["no exchanges observed yet".to_string()],
            };
        };

        let signals = self.boundary_signals();
        if !signals.is_empty() {
            return Recommendation {
                trust_level: TrustLevel::Minimal,
                engagement_mode: EngagementMode::Defensive,
                trajectory: Trajectory::Hostile,
                rationale: signals.iter().map(ToString::to_string).collect(),
            };
        }

        let (trust_level, mut engagement_mode) = if ema >= 0.7 {
            (TrustLevel::High, EngagementMode::Open)
        } else if ema >= 0.5 {
            (TrustLevel::Moderate, EngagementMode::Standard)
        } else if ema >= 0.3 {
            (TrustLevel::Low, EngagementMode::Cautious)
        } else {
            (TrustLevel::Minimal, EngagementMode::Defensive)
        };

        let trajectory = self.trajectory();
        let mut rationale = vec![format!("trust EMA {:.2} over {} exchanges", ema, self.interactions)];
        if trajectory == Trajectory::Degrading {
            engagement_mode = engagement_mode.tightened();
            rationale.push("trust degrading since the first exchange".to_string());
        }

        Recommendation {
            trust_level,
            engagement_mode,
            trajectory,
            rationale,
        }
    }

    /// Current trust EMA.
    #[must_use]
    pub fn trust_ema(&self) -> Option<f64> {
        self.trust_ema
    }

    /// Exchanges accumulated.
    #[inline]
    #[must_use]
    pub const fn interactions(&self) -> u64 {
        self.interactions
    }

    /// Refusals / interactions, zero before any exchange.
    pub fn refusal_rate(&self) -> f64 {
        if self.interactions == 0 {
            0.0
        } else {
            self.refusals as f64 / self.interactions as f64
        }
    }

    /// Count recorded for one violation type.
    pub fn violation_count(&self, violation: TrustViolation) -> u32 {
        self.circuit_breakers.get(&violation).copied().unwrap_or(0)
    }

    /// Count recorded for one exchange type.
    pub fn exchange_count(&self, exchange_type: ExchangeType) -> u32 {
        self.exchange_counts.get(&exchange_type).copied().unwrap_or(0)
    }

    /// Serializable snapshot.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            interactions: self.interactions,
            refusals: self.refusals,
            trust_ema: self.trust_ema,
            initial_trust: self.initial_trust,
            circuit_breakers: self.circuit_breakers.clone(),
            exchange_counts: self.exchange_counts.clone(),
            recent_balances: self.history.iter().map(|e| e.balance).collect(),
            trajectory: self.trajectory(),
            boundary_signals: self.boundary_signals(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(balance: f64, trust: f64, falsehood: f64) -> InteractionObservation {
        InteractionObservation {
            balance,
            exchange_type: ExchangeType::Reciprocal,
            trust_strength: trust,
            violations: Vec::new(),
            max_layer_falsehood: falsehood,
            refused: false,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_config_rejects_bad_alpha_and_windows() {
        assert!(SessionConfig::new().with_ema_alpha(0.0).validate().is_err());
        assert!(SessionConfig::new().with_ema_alpha(1.5).validate().is_err());
        assert!(SessionConfig::new().with_windows(3, 5).validate().is_err());
        assert!(SessionConfig::new().with_windows(5, 0).validate().is_err());
    }

    #[test]
    fn test_ema_update() {
        let mut session = SessionAccumulator::new();
        session.accumulate(observation(0.5, 1.0, 0.0)).unwrap();
        assert_eq!(session.trust_ema(), Some(1.0));

        session.accumulate(observation(0.5, 0.0, 0.0)).unwrap();
        // 0.3 * 0.0 + 0.7 * 1.0
        assert!((session.trust_ema().unwrap() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_observation_leaves_state_untouched() {
        let mut session = SessionAccumulator::new();
        let err = session.accumulate(observation(1.5, 0.5, 0.0)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidObservation { field: "balance", .. }
        ));
        assert_eq!(session.interactions(), 0);
        assert!(session.trust_ema().is_none());
    }

    #[test]
    fn test_violation_threshold_trips_boundary_testing() {
        let mut session = SessionAccumulator::new();
        let mut obs = observation(0.2, 0.5, 0.0);
        obs.violations = vec![TrustViolation::RoleConfusion];

        session.accumulate(obs.clone()).unwrap();
        session.accumulate(obs.clone()).unwrap();
        assert!(!session.assess_boundary_testing());

        session.accumulate(obs).unwrap();
        assert!(session.assess_boundary_testing());
        assert_eq!(session.violation_count(TrustViolation::RoleConfusion), 3);
        assert_eq!(session.trajectory(), Trajectory::Hostile);
    }

    #[test]
    fn test_persistent_falsehood_in_recent_window() {
        let mut session = SessionAccumulator::new();
        for falsehood in [0.7, 0.1, 0.8, 0.2] {
            session.accumulate(observation(0.2, 0.5, falsehood)).unwrap();
        }
        assert!(!session.assess_boundary_testing());

        session.accumulate(observation(0.2, 0.5, 0.9)).unwrap();
        assert!(session
            .boundary_signals()
            .iter()
            .any(|s| matches!(s, BoundarySignal::PersistentFalsehood { count: 3, .. })));
    }

    #[test]
    fn test_old_severe_exchanges_leave_recent_window() {
        let mut session = SessionAccumulator::new();
        for _ in 0..3 {
            session.accumulate(observation(0.2, 0.5, 0.9)).unwrap();
        }
        assert!(session.assess_boundary_testing());

        for _ in 0..5 {
            session.accumulate(observation(0.6, 0.5, 0.0)).unwrap();
        }
        assert!(!session.assess_boundary_testing());
    }

    #[test]
    fn test_negative_recent_balance() {
        let mut session = SessionAccumulator::new();
        for _ in 0..5 {
            session.accumulate(observation(-0.4, 0.5, 0.3)).unwrap();
        }
        assert!(session
            .boundary_signals()
            .iter()
            .any(|s| matches!(s, BoundarySignal::NegativeBalance { .. })));
    }

    #[test]
    fn test_refusal_rate_needs_minimum_interactions() {
        let mut session = SessionAccumulator::new();
        for i in 0..9 {
            session
                .accumulate(observation(0.3, 0.6, 0.0).with_refusal(i % 2 == 0))
                .unwrap();
        }
        // 5 of 9 refused, but fewer than 10 interactions
        assert!(!session.assess_boundary_testing());

        session
            .accumulate(observation(0.3, 0.6, 0.0).with_refusal(false))
            .unwrap();
        // 5 of 10 = 50%
        assert!(session.assess_boundary_testing());
    }

    #[test]
    fn test_trajectory_improving_and_degrading() {
        let mut improving = SessionAccumulator::new();
        improving.accumulate(observation(0.2, 0.3, 0.0)).unwrap();
        for _ in 0..5 {
            improving.accumulate(observation(0.6, 0.9, 0.0)).unwrap();
        }
        assert_eq!(improving.trajectory(), Trajectory::Improving);

        let mut degrading = SessionAccumulator::new();
        degrading.accumulate(observation(0.6, 0.9, 0.0)).unwrap();
        for _ in 0..5 {
            degrading.accumulate(observation(0.2, 0.3, 0.0)).unwrap();
        }
        assert_eq!(degrading.trajectory(), Trajectory::Degrading);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut session =
            SessionAccumulator::with_config(SessionConfig::new().with_windows(4, 2)).unwrap();
        for _ in 0..10 {
            session.accumulate(observation(0.5, 0.5, 0.0)).unwrap();
        }
        assert_eq!(session.summary().recent_balances.len(), 4);
        assert_eq!(session.interactions(), 10);
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let err =
            SessionAccumulator::with_config(SessionConfig::new().with_windows(0, 0)).unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig(_)));

        let err =
            SessionAccumulator::with_config(SessionConfig::new().with_windows(2, 5)).unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig(ref m) if m.contains("windows")));
    }

    #[test]
    fn test_recommendation_levels() {
        let fresh = SessionAccumulator::new().recommend();
        assert_eq!(fresh.trust_level, TrustLevel::Moderate);

        let mut trusted = SessionAccumulator::new();
        trusted.accumulate(observation(0.8, 0.85, 0.0)).unwrap();
        let rec = trusted.recommend();
        assert_eq!(rec.trust_level, TrustLevel::High);
        assert_eq!(rec.engagement_mode, EngagementMode::Open);
    }

    #[test]
    fn test_degrading_session_tightens_engagement() {
        let mut session = SessionAccumulator::new();
        session.accumulate(observation(0.8, 1.0, 0.0)).unwrap();
        session.accumulate(observation(0.5, 0.5, 0.0)).unwrap();
        // ema = 0.3 * 0.5 + 0.7 * 1.0 = 0.85, delta -0.15
        let rec = session.recommend();
        assert_eq!(rec.trajectory, Trajectory::Degrading);
        assert_eq!(rec.trust_level, TrustLevel::High);
        assert_eq!(rec.engagement_mode, EngagementMode::Standard);
    }
}
