use thiserror::Error;

use crate::registry::RegistryError;

/// Batch-level failures. Row-level conditions never surface here; they
/// become a [`crate::model::Outcome`] on the row's decision instead.
#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),
    /// Config validation error (duplicate scheme, bad job count, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),
    /// Input CSV lacks a required column.
    #[error("input is missing required column '{column}'")]
    MissingColumn { column: String },
    /// Input CSV could not be read at all.
    #[error("cannot read input CSV: {0}")]
    InputParse(String),
    /// Registry unreachable before any row was attempted.
    #[error("registry unavailable: {0}")]
    RegistryUnavailable(#[source] RegistryError),
    /// IO error (output file, report, etc.).
    #[error("IO error: {0}")]
    Io(String),
}

impl From<csv::Error> for ReconError {
    fn from(err: csv::Error) -> Self {
        Self::Io(err.to_string())
    }
}
