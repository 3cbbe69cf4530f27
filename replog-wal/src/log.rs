//! Shared log state and positioned I/O.
//!
//! A [`Log`] owns everything that must be agreed on by all handles to one
//! file: the watermark counters, the writer-role token, and a lock-guarded
//! file handle for positioned writes (header persistence and garbage-bit
//! patches). Writers and readers each open their own file handle for
//! sequential scanning, so readers never block the writer or each other.

use crate::error::WalError;
use crate::header::LogHeader;
use crate::reader::LogReader;
use crate::record::FLAG_GARBAGE;
use crate::writer::LogWriter;
use crate::{FORMAT_VERSION, LOG_HEADER_SIZE};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Fsync policy for appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Fsync after every append (safest, slowest).
    #[default]
    EveryWrite,
    /// Fsync after N appends.
    EveryN(u32),
    /// Never fsync automatically (caller must call sync).
    Never,
}

/// Log configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Fsync policy applied by the writer.
    pub sync_policy: SyncPolicy,
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.sync_policy = policy;
        self
    }
}

/// I/O statistics for the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStats {
    /// Total records appended.
    pub records_appended: u64,
    /// Total records returned to readers.
    pub records_read: u64,
    /// Total record bytes written.
    pub bytes_written: u64,
    /// Total fsync operations.
    pub fsyncs: u64,
}

/// A single-file append log.
///
/// Open with [`Log::open`], then mint role handles with [`Log::writer`]
/// (exclusive, at most one at a time) and [`Log::reader`] (any number).
pub struct Log {
    path: PathBuf,
    config: LogConfig,
    /// Handle for positioned writes: header rewrites and garbage patches.
    file: Mutex<File>,
    /// Position of the last record marked as read. Forward-only.
    read_mark: AtomicU64,
    /// Position of the last record appended. Forward-only.
    write_mark: AtomicU64,
    /// Writer-role token: at most one writer handle exists while set.
    writer_active: AtomicBool,
    stats_appended: AtomicU64,
    stats_read: AtomicU64,
    stats_bytes_written: AtomicU64,
    stats_fsyncs: AtomicU64,
}

impl Log {
    /// Opens or creates the log file at `path`.
    ///
    /// An empty file gets a fresh header; otherwise the existing header is
    /// parsed and validated. A short file or a version mismatch is a fatal
    /// format error.
    pub fn open(path: impl Into<PathBuf>, config: LogConfig) -> Result<Arc<Self>, WalError> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let size = file.metadata()?.len();
        let header = if size == 0 {
            let header = LogHeader::new();
            file.write_all(&header.encode())?;
            file.sync_data()?;
            tracing::debug!(path = %path.display(), "initialized fresh log");
            header
        } else {
            let mut buf = vec![0u8; LOG_HEADER_SIZE as usize];
            file.seek(SeekFrom::Start(0))?;
            match file.read_exact(&mut buf) {
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(WalError::TruncatedHeader {
                        size,
                        need: LOG_HEADER_SIZE,
                    });
                }
                other => other?,
            }
            LogHeader::decode(&buf)?
        };

        tracing::debug!(
            path = %path.display(),
            read_mark = header.last_read_position,
            write_mark = header.last_write_position,
            "opened log"
        );

        Ok(Arc::new(Self {
            path,
            config,
            file: Mutex::new(file),
            read_mark: AtomicU64::new(header.last_read_position),
            write_mark: AtomicU64::new(header.last_write_position),
            writer_active: AtomicBool::new(false),
            stats_appended: AtomicU64::new(0),
            stats_read: AtomicU64::new(0),
            stats_bytes_written: AtomicU64::new(0),
            stats_fsyncs: AtomicU64::new(0),
        }))
    }

    /// Acquires the exclusive writer handle.
    ///
    /// Fails immediately with [`WalError::WriterActive`] if another writer
    /// is open; never blocks.
    pub fn writer(self: &Arc<Self>) -> Result<LogWriter, WalError> {
        LogWriter::open(Arc::clone(self))
    }

    /// Opens a reader handle with its own independent scan cursor.
    pub fn reader(self: &Arc<Self>) -> Result<LogReader, WalError> {
        LogReader::open(Arc::clone(self))
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the log configuration.
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Current read watermark (position of the last record marked read).
    pub fn read_mark(&self) -> u64 {
        self.read_mark.load(Ordering::Acquire)
    }

    /// Current write watermark (position of the last record appended).
    pub fn write_mark(&self) -> u64 {
        self.write_mark.load(Ordering::Acquire)
    }

    /// Folds a read progress report into the watermark, forward-only.
    pub(crate) fn note_read(&self, position: u64) {
        self.read_mark.fetch_max(position, Ordering::AcqRel);
    }

    /// Folds a write progress report into the watermark, forward-only.
    pub(crate) fn note_write(&self, position: u64) {
        self.write_mark.fetch_max(position, Ordering::AcqRel);
    }

    pub(crate) fn acquire_writer(&self) -> Result<(), WalError> {
        self.writer_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| WalError::WriterActive)?;
        Ok(())
    }

    pub(crate) fn release_writer(&self) {
        self.writer_active.store(false, Ordering::Release);
    }

    /// Sets the garbage bit of the record at `position` in place.
    ///
    /// A single-byte read-modify-write of the record's flags byte; payload
    /// and neighboring records are untouched. Additive and irreversible.
    pub fn mark_garbage(&self, position: u64) -> Result<(), WalError> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(position))?;
        let mut flags = [0u8; 1];
        file.read_exact(&mut flags)?;
        if flags[0] & FLAG_GARBAGE != 0 {
            return Ok(());
        }
        file.seek(SeekFrom::Start(position))?;
        file.write_all(&[flags[0] | FLAG_GARBAGE])?;
        tracing::trace!(position, "marked record as garbage");
        Ok(())
    }

    /// Persists a header carrying the current watermarks.
    pub(crate) fn persist_header(&self) -> Result<(), WalError> {
        let header = LogHeader {
            version: FORMAT_VERSION,
            last_read_position: self.read_mark(),
            last_write_position: self.write_mark(),
        };
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.encode())?;
        file.sync_data()?;
        self.stats_fsyncs.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            read_mark = header.last_read_position,
            write_mark = header.last_write_position,
            "persisted log header"
        );
        Ok(())
    }

    /// Shrinks the file to header-only size and zeroes both watermarks.
    ///
    /// The one sanctioned watermark regression; everything else goes
    /// through the forward-only `note_*` path.
    pub(crate) fn truncate_to_header(&self) -> Result<(), WalError> {
        let mut file = self.file.lock();
        file.set_len(LOG_HEADER_SIZE)?;
        self.read_mark.store(0, Ordering::Release);
        self.write_mark.store(0, Ordering::Release);
        let header = LogHeader::new();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header.encode())?;
        file.sync_data()?;
        self.stats_fsyncs.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(path = %self.path.display(), "truncated log, all records discarded");
        Ok(())
    }

    /// Forces a sync of the shared file handle.
    pub fn sync(&self) -> Result<(), WalError> {
        self.file.lock().sync_data()?;
        self.stats_fsyncs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Returns the current file size in bytes.
    pub fn len(&self) -> Result<u64, WalError> {
        Ok(self.file.lock().metadata()?.len())
    }

    /// Returns whether the log holds no records.
    pub fn is_empty(&self) -> Result<bool, WalError> {
        Ok(self.len()? <= LOG_HEADER_SIZE)
    }

    /// Returns a snapshot of the I/O statistics.
    pub fn stats(&self) -> LogStats {
        LogStats {
            records_appended: self.stats_appended.load(Ordering::Relaxed),
            records_read: self.stats_read.load(Ordering::Relaxed),
            bytes_written: self.stats_bytes_written.load(Ordering::Relaxed),
            fsyncs: self.stats_fsyncs.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_append(&self, bytes: u64) {
        self.stats_appended.fetch_add(1, Ordering::Relaxed);
        self.stats_bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self) {
        self.stats_read.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fsync(&self) {
        self.stats_fsyncs.fetch_add(1, Ordering::Relaxed);
    }
}
