//! Journal error types.

use replog_wal::WalError;
use thiserror::Error;

/// Errors that can occur during journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("log error: {0}")]
    Wal(#[from] WalError),

    #[error("descriptor encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("unsupported descriptor schema {found} (supported: {supported})")]
    UnsupportedSchema { found: u32, supported: u32 },
}

impl JournalError {
    /// Returns whether the underlying log file format is unusable.
    ///
    /// When this is true the journal cannot be read further; the caller
    /// decides between abandoning the history
    /// ([`truncate_all`](crate::RequestJournal::truncate_all)) and failing
    /// startup.
    pub fn is_format_error(&self) -> bool {
        match self {
            JournalError::Wal(e) => e.is_format_error(),
            JournalError::Codec(_) => false,
            JournalError::UnsupportedSchema { .. } => true,
        }
    }
}
