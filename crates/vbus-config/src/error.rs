//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;
use vbus_sim::SimError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("scenario file not found at {path}")]
    NotFound { path: PathBuf },

    #[error("failed to write scenario to {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to render scenario as TOML: {0}")]
    RenderError(#[from] toml::ser::Error),

    #[error("failed to parse scenario TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("invalid scenario: {0}")]
    ValidationError(#[from] SimError),
}
