//! # Ayni Reciprocity
//!
//! Neutrosophic model and reciprocity scoring for layered prompts.
//!
//! ## Overview
//!
//! A prompt submitted to an assistant is rarely a single message. It is a
//! stack of layers (system instructions, application scaffolding, user
//! input), each of which can be judged independently on three axes:
//!
//! - **Truth**: how reciprocal the layer is
//! - **Indeterminacy**: how uncertain the judgment is
//! - **Falsehood**: how extractive or violating the layer is
//!
//! The three values are independent (they need not sum to one), which lets
//! an evaluator say "this is mostly fine, partly unclear, and a little
//! manipulative" without forcing a single probability.
//!
//! ## Threat Model
//!
//! ### Dilution
//! A manipulative user layer wrapped in polite system and application
//! layers would average out to a benign score. The scorer applies a flat
//! penalty whenever any single layer crosses the severe falsehood line, so
//! one bad layer dominates the balance.
//!
//! ### Role Confusion and Context Saturation
//! Trust violations are derived from evaluator judgments, never from
//! keyword matching on raw text. Length alone never flags saturation.
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`MultiNeutrosophicPrompt`] | Layered prompt with T/I/F evaluations |
//! | [`TrustCalculator`] | Trust field from structural signals |
//! | [`ReciprocityScorer`] | Ayni balance and exchange classification |
//! | [`ConsensusCalculator`] | Agreement among independent judgments |
//!
//! ## Example
//!
//! ```rust
//! use ayni_reciprocity::{
//!     LayerPriority, MultiNeutrosophicPrompt, ReciprocityScorer, SourceType, Tif,
//! };
//!
//! let mut prompt = MultiNeutrosophicPrompt::new();
//! let layer = prompt.add_layer("You are a helpful assistant.", LayerPriority::System);
//! layer.add_evaluation(Tif::new(0.9, 0.1, 0.0)?, SourceType::Semantic);
//!
//! let metrics = ReciprocityScorer::new().score(&prompt)?;
//! assert!(metrics.ayni_balance > 0.0);
//! # Ok::<(), ayni_reciprocity::ReciprocityError>(())
//! ```

pub mod consensus;
pub mod error;
pub mod neutrosophic;
pub mod reciprocity;
pub mod trust;

pub use consensus::{ConsensusCalculator, ConsensusMeasure, Dispersion};
pub use error::ReciprocityError;
pub use neutrosophic::{
    Contradiction, ContradictionKind, Evaluation, LayerPriority, MultiNeutrosophicPrompt,
    NeutrosophicLayer, SourceType, Tif,
};
pub use reciprocity::{ExchangeType, ReciprocityMetrics, ReciprocityScorer, ValueFlow};
pub use trust::{TrustCalculator, TrustField, TrustViolation};

/// Result type for reciprocity operations.
pub type Result<T> = std::result::Result<T, ReciprocityError>;
