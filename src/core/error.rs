use rusqlite;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Phase or round precondition violated. Nothing was persisted.
    #[error(
        "Invalid phase sequence for session {session_id}: cannot record {phase} (expected {expected}, found {found})"
    )]
    InvalidPhaseSequence {
        session_id: String,
        phase: String,
        expected: String,
        found: String,
    },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] rusqlite::Error),
    #[error("Archive write failed: {0}")]
    ArchiveWriteFailed(String),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(String),
}

impl LedgerError {
    /// Stable machine-readable code used in CLI error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidPhaseSequence { .. } => "invalid_phase_sequence",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::ValidationError(_) => "validation_error",
            LedgerError::StorageUnavailable(_) => "storage_unavailable",
            LedgerError::ArchiveWriteFailed(_) => "archive_write_failed",
            LedgerError::IoError(_) => "io_error",
            LedgerError::JsonError(_) => "json_error",
            LedgerError::ConfigError(_) => "config_error",
        }
    }
}
