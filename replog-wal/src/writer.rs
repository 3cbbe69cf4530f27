//! Exclusive log writer.

use crate::error::WalError;
use crate::log::{Log, SyncPolicy};
use crate::record::Record;
use crate::LOG_HEADER_SIZE;
use bytes::Bytes;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;

/// The single writing handle on a log.
///
/// Acquired through [`Log::writer`]; at most one exists per log at a time.
/// On open, the writer scans forward from the persisted write watermark to
/// the true end of the log, so records appended after the last clean header
/// write are recovered rather than overwritten.
///
/// Dropping the writer always releases the exclusive role. Only
/// [`close`](LogWriter::close) persists the header; a plain drop leaves the
/// on-disk watermarks stale, which the next open recovers from by scanning.
pub struct LogWriter {
    log: Arc<Log>,
    file: File,
    /// Byte offset where the next record will be written. Always the true
    /// end of the record stream, re-derived at open.
    tail: u64,
    writes_since_sync: u32,
}

impl LogWriter {
    pub(crate) fn open(log: Arc<Log>) -> Result<Self, WalError> {
        log.acquire_writer()?;
        match Self::recover_tail(&log) {
            Ok((file, tail)) => Ok(Self {
                log,
                file,
                tail,
                writes_since_sync: 0,
            }),
            Err(e) => {
                log.release_writer();
                Err(e)
            }
        }
    }

    /// Scans from the persisted write watermark to find the true tail.
    fn recover_tail(log: &Log) -> Result<(File, u64), WalError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(log.path())?;
        let size = file.metadata()?.len();

        let mut position = log.write_mark().max(LOG_HEADER_SIZE);
        if position > size {
            // A hint past end-of-file cannot be trusted; rescan everything.
            position = LOG_HEADER_SIZE;
        }

        let hint = position;
        file.seek(SeekFrom::Start(position))?;
        loop {
            match Record::decode(&mut file, position)? {
                Some(record) => {
                    log.note_write(position);
                    position += record.disk_size() as u64;
                }
                None => break,
            }
        }

        if position > hint {
            tracing::debug!(hint, tail = position, "recovered log tail past stale watermark");
        }

        Ok((file, position))
    }

    /// Appends a record at the end of the log.
    ///
    /// Advances the write watermark to the new record's own start offset
    /// and returns the record with its resolved position, the caller's
    /// correlation handle.
    pub fn append(
        &mut self,
        record_type: u8,
        reference: i64,
        payload: Bytes,
    ) -> Result<Record, WalError> {
        let record = Record::new(record_type, reference, payload, self.tail);
        let encoded = record.encode()?;

        self.file.seek(SeekFrom::Start(self.tail))?;
        self.file.write_all(&encoded)?;
        self.tail += encoded.len() as u64;

        self.log.note_write(record.position);
        self.log.record_append(encoded.len() as u64);
        self.apply_sync_policy()?;

        tracing::trace!(
            position = record.position,
            record_type,
            reference,
            len = record.payload.len(),
            "appended record"
        );
        Ok(record)
    }

    fn apply_sync_policy(&mut self) -> Result<(), WalError> {
        self.writes_since_sync += 1;
        match self.log.config().sync_policy {
            SyncPolicy::EveryWrite => self.sync()?,
            SyncPolicy::EveryN(n) if self.writes_since_sync >= n => self.sync()?,
            _ => {}
        }
        Ok(())
    }

    /// Forces a sync of appended data to disk.
    pub fn sync(&mut self) -> Result<(), WalError> {
        self.file.sync_data()?;
        self.log.record_fsync();
        self.writes_since_sync = 0;
        Ok(())
    }

    /// Resets the log to contain only a fresh header.
    ///
    /// Discards every record and zeroes both watermarks.
    pub fn truncate(&mut self) -> Result<(), WalError> {
        self.log.truncate_to_header()?;
        self.tail = LOG_HEADER_SIZE;
        Ok(())
    }

    /// Offset at which the next record will be appended.
    pub fn tail(&self) -> u64 {
        self.tail
    }

    /// Persists a header reflecting the current watermarks, then releases
    /// the writer role.
    pub fn close(self) -> Result<(), WalError> {
        self.log.persist_header()
        // Drop releases the role on this and every other exit path.
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.log.release_writer();
    }
}
