//! # replog-wal
//!
//! Single-file write-ahead log for the replog client SDK.
//!
//! This crate provides a durable, append-only log with:
//! - Fixed-header record framing over opaque payloads
//! - A single exclusive writer and any number of concurrent readers
//! - Watermark-based recovery after abnormal termination
//! - In-place garbage marking for already-processed records
//!
//! The persisted watermarks in the log header are hints, never ground
//! truth: every writer and reader open re-derives the real tail/unread
//! state by scanning forward from the persisted position.

pub mod error;
pub mod header;
pub mod log;
pub mod reader;
pub mod record;
pub mod writer;

pub use error::WalError;
pub use header::LogHeader;
pub use log::{Log, LogConfig, LogStats, SyncPolicy};
pub use reader::LogReader;
pub use record::{Record, FLAG_GARBAGE, MAX_RECORD_SIZE, NO_REFERENCE};
pub use writer::LogWriter;

/// On-disk format version, stored in the log header.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the log header at offset 0 (version + two watermarks).
pub const LOG_HEADER_SIZE: u64 = 20;

/// Fixed record header size in bytes.
pub const RECORD_HEADER_SIZE: usize = 16;
