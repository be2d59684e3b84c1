//! Crate-level error type.
//!
//! Nearly every operator-facing operation in this crate returns a result
//! record (see [`crate::results`]), never `Result<_, OrchestratorError>` —
//! per the spec's error handling design, construction-time violations are
//! the only hard failure mode, alongside the `unknown_error` wrapping path
//! used when an internal invariant is violated.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("invalid component name {name:?}: must be strict kebab-case matching ^[a-z0-9]+(-[a-z0-9]+)*$")]
    InvalidComponentName { name: String },

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
