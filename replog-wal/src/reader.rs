//! Shared log readers.

use crate::error::WalError;
use crate::log::Log;
use crate::record::Record;
use crate::LOG_HEADER_SIZE;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::sync::Arc;

/// A reading handle on a log.
///
/// Readers are not exclusive: any number may run concurrently with each
/// other and with the active writer, each over its own file handle and
/// scan cursor. The cursor starts at the read watermark and every scan
/// skips records whose garbage bit is already set, so a crash between
/// marking a record and persisting the header costs a re-scan, never a
/// skipped record.
pub struct LogReader {
    log: Arc<Log>,
    file: File,
    /// Scan cursor: offset of the next record to consider.
    position: u64,
}

impl LogReader {
    pub(crate) fn open(log: Arc<Log>) -> Result<Self, WalError> {
        let file = OpenOptions::new().read(true).open(log.path())?;
        let position = log.read_mark().max(LOG_HEADER_SIZE);
        let mut reader = Self {
            log,
            file,
            position,
        };
        // Settle on the first unread record (or end-of-file) right away.
        reader.skip_garbage()?;
        Ok(reader)
    }

    fn skip_garbage(&mut self) -> Result<(), WalError> {
        loop {
            self.file.seek(SeekFrom::Start(self.position))?;
            match Record::decode(&mut self.file, self.position)? {
                Some(record) if record.is_garbage() => {
                    self.position += record.disk_size() as u64;
                }
                _ => return Ok(()),
            }
        }
    }

    /// Returns the next unread record, or `None` at end-of-file.
    ///
    /// Records already marked as garbage are skipped. When `mark_as_read`
    /// is set, the returned record's garbage bit is patched in place and
    /// the read watermark advances to its position; otherwise the call
    /// leaves the log untouched and only this handle's cursor moves.
    pub fn read_next(&mut self, mark_as_read: bool) -> Result<Option<Record>, WalError> {
        loop {
            self.file.seek(SeekFrom::Start(self.position))?;
            match Record::decode(&mut self.file, self.position)? {
                None => return Ok(None),
                Some(record) if record.is_garbage() => {
                    self.position += record.disk_size() as u64;
                }
                Some(record) => {
                    self.position += record.disk_size() as u64;
                    if mark_as_read {
                        self.mark_read(&record)?;
                    }
                    self.log.record_read();
                    return Ok(Some(record));
                }
            }
        }
    }

    /// Marks a previously returned record as read.
    ///
    /// Patches the garbage bit at the record's position and folds the
    /// position into the read watermark. For callers that peeked with
    /// `read_next(false)` and decided afterwards.
    pub fn mark_read(&self, record: &Record) -> Result<(), WalError> {
        self.log.mark_garbage(record.position)?;
        self.log.note_read(record.position);
        Ok(())
    }

    /// Current scan cursor of this handle.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Persists a header with the current watermarks and releases the
    /// file handle.
    pub fn close(self) -> Result<(), WalError> {
        self.log.persist_header()
    }
}
