//! Error types for Ayni Core.

use std::path::PathBuf;

use thiserror::Error;

/// Core error type for guard operations.
#[derive(Debug, Error)]
pub enum AyniError {
    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("Cannot read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid TOML for [`AyniConfig`](crate::AyniConfig).
    #[error("Cannot parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// The prompt cannot be assessed as given.
    #[error("Invalid prompt: {0}")]
    InvalidPrompt(String),

    /// Reciprocity error passthrough.
    #[error("Reciprocity error: {0}")]
    Reciprocity(#[from] ayni_reciprocity::ReciprocityError),

    /// Session error passthrough.
    #[error("Session error: {0}")]
    Session(#[from] ayni_session::SessionError),

    /// Council error passthrough.
    #[error("Council error: {0}")]
    Council(#[from] ayni_council::CouncilError),
}
