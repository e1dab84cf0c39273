use std::result::Result as StdResult;

use thiserror::Error;

/// Error type that captures journal loading and mutation failures.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("cannot read {origin}: {source}")]
    StructuralRead {
        origin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transaction `{payee}` rejected: {reason}")]
    CandidateRejected { payee: String, reason: String },
    #[error("strict parse of {origin} aborted: {diagnostic}")]
    StrictModeAbort { origin: String, diagnostic: String },
    #[error("Invalid account pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("Unsupported snapshot schema version {0}")]
    UnsupportedSchema(u8),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = StdResult<T, JournalError>;

/// Reason reported by a finalizer that refuses a transaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct FinalizeError {
    pub reason: String,
}

impl FinalizeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
