//! # Ayni Core
//!
//! Unified reciprocity guard for layered prompts.
//! Orchestrates the Fire Circle, the reciprocity scorer and the session
//! accumulator.
//!
//! ## Threat Coverage
//!
//! | Layer | Component | Threats Surfaced |
//! |-------|-----------|------------------|
//! | Judgment | Fire Circle | Single-evaluator compromise, unreliable evaluators |
//! | Prompt | Reciprocity Scorer | Extraction, role confusion, polite dilution |
//! | Session | Session Accumulator | Boundary testing, trust erosion |
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          AYNI CORE                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │                    ┌─────────────────┐                          │
//! │                    │   AyniGuard     │  ← Unified Facade        │
//! │                    └────────┬────────┘                          │
//! │                             │                                   │
//! │         ┌───────────────────┼───────────────────┐               │
//! │         ▼                   ▼                   ▼               │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐          │
//! │  │    Fire     │    │ Reciprocity │    │   Session   │          │
//! │  │   Circle    │    │   Scorer    │    │ Accumulator │          │
//! │  └─────────────┘    └─────────────┘    └─────────────┘          │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ayni_core::{AyniConfig, AyniGuard, Verdict};
//!
//! let guard = AyniGuard::new(AyniConfig::default(), Arc::new(client))?;
//! let assessment = guard.assess(&mut prompt, &participants, None).await?;
//! match assessment.verdict {
//!     Verdict::Allow => forward(prompt),
//!     Verdict::Block { reason } => reject(reason),
//!     Verdict::Review { flags } => escalate(flags),
//! }
//! ```
//!
//! ## Security Notes
//!
//! - Every layer is judged by its own circle; the worst judgment wins
//! - A circle that loses quorum is an error, never an Allow
//! - Session advice only ever tightens the verdict

mod config;
mod error;
mod guard;
mod verdict;

pub use config::{AyniConfig, CircleConfig, GlobalConfig, ScoringConfig};
pub use error::AyniError;
pub use guard::{Assessment, AyniGuard, LayerAssessment};
pub use verdict::{BlockReason, ReviewFlag, Verdict};

// Re-export component types for convenience
pub use ayni_council::{
    FailureMode, FireCircle, FireCircleConfig, FireCircleResult, InferenceClient, ReplayClient,
};
pub use ayni_reciprocity::{
    ExchangeType, LayerPriority, MultiNeutrosophicPrompt, ReciprocityMetrics, SourceType, Tif,
};
pub use ayni_session::{Recommendation, SessionAccumulator, SessionConfig, Trajectory};

/// Core result type for guard operations.
pub type Result<T> = std::result::Result<T, AyniError>;
