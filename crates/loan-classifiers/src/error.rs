use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the loan-default workflow.
#[derive(Debug, Error)]
pub enum LoanError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("schema error: {0}")]
    Schema(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("invalid label: {0}")]
    InvalidLabel(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The model cannot produce the requested output (e.g. probabilities).
    #[error("capability mismatch: {0}")]
    Capability(String),

    #[error("model fitting failed: {0}")]
    Model(String),

    #[error("metric undefined: {0}")]
    Metric(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LoanError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LoanError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        LoanError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoanError>;
