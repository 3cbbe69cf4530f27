//! WAL error types.

use thiserror::Error;

/// Errors that can occur during log operations.
#[derive(Debug, Error)]
pub enum WalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported log format version {found} (expected {expected})")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("truncated log header: {size} bytes (need {need})")]
    TruncatedHeader { size: u64, need: u64 },

    #[error("invalid record header at offset {offset}: {reason}")]
    InvalidHeader { offset: u64, reason: String },

    #[error("record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    #[error("a writer is already open on this log")]
    WriterActive,
}

impl WalError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalError::Io(_))
    }

    /// Returns whether this error indicates an unusable on-disk format.
    ///
    /// Format errors are fatal for the log instance; the caller decides
    /// whether to abandon the file (truncate) or fail startup.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            WalError::VersionMismatch { .. }
                | WalError::TruncatedHeader { .. }
                | WalError::InvalidHeader { .. }
                | WalError::RecordTooLarge { .. }
        )
    }
}
