//! The request journal.

use crate::descriptor::OperationDescriptor;
use crate::error::JournalError;
use bytes::Bytes;
use parking_lot::Mutex;
use replog_wal::{Log, LogConfig, LogWriter, NO_REFERENCE};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Record type tag for REQUEST records (operation attempted).
pub const REQUEST: u8 = 1;

/// Record type tag for RESPONSE records (operation acknowledged).
pub const RESPONSE: u8 = 2;

/// A journaled operation with no acknowledgment yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingOperation {
    /// Position of the REQUEST record; the correlation handle passed to
    /// [`RequestJournal::acknowledge`].
    pub position: u64,
    /// The operation to replay.
    pub descriptor: OperationDescriptor,
}

/// Tracks which outbound operations remain unacknowledged.
///
/// A REQUEST record is appended before an operation is attempted and a
/// RESPONSE record acknowledges it on a definitive outcome. The pending
/// set is derived, never stored: a forward scan from the read watermark
/// collects REQUESTs and drops each one a RESPONSE refers back to.
///
/// The journal holds the log's single writer for its whole lifetime;
/// scans open short-lived readers.
pub struct RequestJournal {
    log: Arc<Log>,
    writer: Mutex<LogWriter>,
}

impl RequestJournal {
    /// Opens or creates the journal file at `path`.
    pub fn open(path: impl AsRef<Path>, config: LogConfig) -> Result<Self, JournalError> {
        let log = Log::open(path.as_ref(), config)?;
        let writer = log.writer()?;
        Ok(Self {
            log,
            writer: Mutex::new(writer),
        })
    }

    /// Journals an operation about to be attempted.
    ///
    /// Returns the REQUEST position as the correlation handle, or `None`
    /// if journaling failed. Failure is downgraded to a logged condition:
    /// durability of the replay record is a best-effort enhancement to the
    /// operation, never a precondition for it.
    pub fn log_operation(&self, descriptor: &OperationDescriptor) -> Option<u64> {
        match self.try_log_operation(descriptor) {
            Ok(position) => Some(position),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    target = %descriptor.target,
                    "failed to journal operation, it will not be replayable"
                );
                None
            }
        }
    }

    /// Fallible form of [`log_operation`](Self::log_operation).
    pub fn try_log_operation(&self, descriptor: &OperationDescriptor) -> Result<u64, JournalError> {
        let payload = descriptor.encode()?;
        let record = self.writer.lock().append(REQUEST, NO_REFERENCE, payload)?;
        tracing::trace!(position = record.position, target = %descriptor.target, "journaled operation");
        Ok(record.position)
    }

    /// Acknowledges the operation journaled at `position`.
    ///
    /// Appends a RESPONSE record; the REQUEST bytes are never removed,
    /// only superseded. Like [`log_operation`](Self::log_operation),
    /// failure is downgraded to a logged condition.
    pub fn acknowledge(&self, position: u64) {
        if let Err(e) = self.try_acknowledge(position) {
            tracing::warn!(
                error = %e,
                position,
                "failed to journal acknowledgment, operation may be replayed again"
            );
        }
    }

    /// Fallible form of [`acknowledge`](Self::acknowledge).
    pub fn try_acknowledge(&self, position: u64) -> Result<(), JournalError> {
        self.writer
            .lock()
            .append(RESPONSE, position as i64, Bytes::new())?;
        tracing::trace!(position, "acknowledged operation");
        Ok(())
    }

    /// Returns the still-unacknowledged operations in original append
    /// order.
    ///
    /// When `consume` is true, every record visited by the scan is marked
    /// garbage and the watermark advances, so a later call only sees
    /// records appended afterwards; the caller takes responsibility for
    /// replaying (and re-journaling) what was returned. When false, the
    /// call is a non-destructive peek, idempotent while nothing is
    /// written.
    pub fn pending_operations(&self, consume: bool) -> Result<Vec<PendingOperation>, JournalError> {
        let mut reader = self.log.reader()?;
        let mut visited = Vec::new();
        let mut pending: BTreeMap<u64, OperationDescriptor> = BTreeMap::new();

        // An early return here drops the reader without close(); that only
        // skips the header rewrite, and watermarks are re-derived by
        // scanning anyway.
        while let Some(record) = reader.read_next(false)? {
            match record.record_type {
                REQUEST => {
                    let descriptor = OperationDescriptor::decode(&record.payload)?;
                    pending.insert(record.position, descriptor);
                }
                RESPONSE => {
                    if record.reference >= 0 {
                        pending.remove(&(record.reference as u64));
                    }
                }
                other => {
                    tracing::debug!(
                        record_type = other,
                        position = record.position,
                        "skipping record of foreign type"
                    );
                }
            }
            visited.push(record);
        }

        // Mark only after the whole scan decoded cleanly: a failure
        // mid-scan must never consume records the caller was not handed.
        if consume {
            for record in &visited {
                reader.mark_read(record)?;
            }
        }
        reader.close()?;

        // BTreeMap iteration is position order, which is append order.
        Ok(pending
            .into_iter()
            .map(|(position, descriptor)| PendingOperation {
                position,
                descriptor,
            })
            .collect())
    }

    /// Marks every record up to and including `position` as read.
    ///
    /// For callers that know a safe cut point without enumerating the
    /// pending set.
    pub fn advance_mark(&self, position: u64) -> Result<(), JournalError> {
        let mut reader = self.log.reader()?;
        // As in pending_operations, an error drops the reader without
        // close(); the unpersisted watermark is recovered by scanning.
        while let Some(record) = reader.read_next(false)? {
            if record.position > position {
                break;
            }
            reader.mark_read(&record)?;
        }
        reader.close()?;
        Ok(())
    }

    /// Discards all journal history.
    ///
    /// Used to abandon a corrupt or unrecoverable journal; the file shrinks
    /// back to header-only size.
    pub fn truncate_all(&self) -> Result<(), JournalError> {
        self.writer.lock().truncate()?;
        Ok(())
    }

    /// Forces journaled records to disk regardless of the sync policy.
    pub fn sync(&self) -> Result<(), JournalError> {
        self.writer.lock().sync()?;
        Ok(())
    }

    /// Returns the underlying log (for size/stats inspection).
    pub fn log(&self) -> &Arc<Log> {
        &self.log
    }

    /// Persists the log header and releases the writer role.
    pub fn close(self) -> Result<(), JournalError> {
        self.writer.into_inner().close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Method;
    use replog_wal::{WalError, LOG_HEADER_SIZE};
    use serde_json::json;
    use tempfile::TempDir;

    fn open_journal(dir: &TempDir) -> RequestJournal {
        RequestJournal::open(dir.path().join("requests.wal"), LogConfig::new()).unwrap()
    }

    fn descriptor(name: &str) -> OperationDescriptor {
        OperationDescriptor::new(
            Method::Post,
            "/api/v1/series",
            json!({ "series": name }),
        )
    }

    #[test]
    fn test_scenario_log_ack_truncate() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);

        let p1 = journal.try_log_operation(&descriptor("req-A")).unwrap();
        let p2 = journal.try_log_operation(&descriptor("req-B")).unwrap();
        assert!(p2 > p1);

        let pending = journal.pending_operations(false).unwrap();
        assert_eq!(
            pending.iter().map(|p| p.position).collect::<Vec<_>>(),
            vec![p1, p2]
        );

        journal.acknowledge(p1);
        let pending = journal.pending_operations(false).unwrap();
        assert_eq!(
            pending.iter().map(|p| p.position).collect::<Vec<_>>(),
            vec![p2]
        );
        assert_eq!(pending[0].descriptor, descriptor("req-B"));

        journal.truncate_all().unwrap();
        assert!(journal.pending_operations(false).unwrap().is_empty());
    }

    #[test]
    fn test_acknowledgment_count_law() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);

        let positions: Vec<u64> = (0..5)
            .map(|i| journal.try_log_operation(&descriptor(&format!("op-{i}"))).unwrap())
            .collect();

        journal.acknowledge(positions[1]);
        journal.acknowledge(positions[3]);

        let pending = journal.pending_operations(false).unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(
            pending.iter().map(|p| p.position).collect::<Vec<_>>(),
            vec![positions[0], positions[2], positions[4]]
        );
    }

    #[test]
    fn test_ordering_despite_interleaved_responses() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);

        let p1 = journal.try_log_operation(&descriptor("a")).unwrap();
        let p2 = journal.try_log_operation(&descriptor("b")).unwrap();
        journal.acknowledge(p2); // out of order
        let p3 = journal.try_log_operation(&descriptor("c")).unwrap();
        journal.acknowledge(p1);
        let p4 = journal.try_log_operation(&descriptor("d")).unwrap();

        let pending = journal.pending_operations(false).unwrap();
        let positions: Vec<u64> = pending.iter().map(|p| p.position).collect();
        assert_eq!(positions, vec![p3, p4]);
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_peek_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);

        journal.try_log_operation(&descriptor("a")).unwrap();
        journal.try_log_operation(&descriptor("b")).unwrap();

        let first = journal.pending_operations(false).unwrap();
        let second = journal.pending_operations(false).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_consume_narrows_future_scans() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);

        journal.try_log_operation(&descriptor("a")).unwrap();
        journal.try_log_operation(&descriptor("b")).unwrap();

        let drained = journal.pending_operations(true).unwrap();
        assert_eq!(drained.len(), 2);

        assert!(journal.pending_operations(true).unwrap().is_empty());

        // Records appended afterwards are visible again.
        journal.try_log_operation(&descriptor("c")).unwrap();
        assert_eq!(journal.pending_operations(true).unwrap().len(), 1);
    }

    #[test]
    fn test_truncate_resets_file_to_header_size() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);

        for i in 0..4 {
            journal.try_log_operation(&descriptor(&format!("op-{i}"))).unwrap();
        }
        assert!(journal.log().len().unwrap() > LOG_HEADER_SIZE);

        journal.truncate_all().unwrap();
        assert_eq!(journal.log().len().unwrap(), LOG_HEADER_SIZE);
        assert!(journal.pending_operations(false).unwrap().is_empty());
    }

    #[test]
    fn test_advance_mark_cuts_up_to_position() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);

        let p1 = journal.try_log_operation(&descriptor("a")).unwrap();
        let p2 = journal.try_log_operation(&descriptor("b")).unwrap();
        let p3 = journal.try_log_operation(&descriptor("c")).unwrap();

        journal.advance_mark(p2).unwrap();

        let pending = journal.pending_operations(false).unwrap();
        assert_eq!(
            pending.iter().map(|p| p.position).collect::<Vec<_>>(),
            vec![p3]
        );
        assert!(p1 < p2);
    }

    #[test]
    fn test_pending_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requests.wal");
        let kept;

        {
            let journal = RequestJournal::open(&path, LogConfig::new()).unwrap();
            let acked = journal.try_log_operation(&descriptor("acked")).unwrap();
            kept = journal.try_log_operation(&descriptor("kept")).unwrap();
            journal.acknowledge(acked);
            journal.close().unwrap();
        }

        let journal = RequestJournal::open(&path, LogConfig::new()).unwrap();
        let pending = journal.pending_operations(false).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].position, kept);
        assert_eq!(pending[0].descriptor, descriptor("kept"));
    }

    #[test]
    fn test_pending_survives_crash_without_close() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requests.wal");

        {
            let journal = RequestJournal::open(&path, LogConfig::new()).unwrap();
            journal.try_log_operation(&descriptor("a")).unwrap();
            journal.try_log_operation(&descriptor("b")).unwrap();
            // Dropped without close: stale header, records only reachable
            // by the forward scan.
        }

        let journal = RequestJournal::open(&path, LogConfig::new()).unwrap();
        assert_eq!(journal.pending_operations(false).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_scan_consumes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("requests.wal");

        // Seed the log with a valid REQUEST followed by one whose payload
        // is not a descriptor at all.
        {
            let log = Log::open(&path, LogConfig::new()).unwrap();
            let mut writer = log.writer().unwrap();
            writer
                .append(REQUEST, NO_REFERENCE, descriptor("good").encode().unwrap())
                .unwrap();
            writer
                .append(REQUEST, NO_REFERENCE, Bytes::from_static(b"not json"))
                .unwrap();
            writer.close().unwrap();
        }

        let journal = RequestJournal::open(&path, LogConfig::new()).unwrap();
        assert!(journal.pending_operations(true).is_err());

        // The failed consuming scan must not have marked anything: the
        // valid operation is still live for a caller that truncates or
        // repairs and retries.
        assert_eq!(journal.log().read_mark(), 0);
        let mut reader = journal.log().reader().unwrap();
        let first = reader.read_next(false).unwrap().unwrap();
        assert!(!first.is_garbage());
        assert_eq!(
            OperationDescriptor::decode(&first.payload).unwrap(),
            descriptor("good")
        );
    }

    #[test]
    fn test_second_journal_on_same_log_cannot_write() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);

        let second = journal.log().writer();
        assert!(matches!(second, Err(WalError::WriterActive)));
    }

    #[test]
    fn test_log_operation_downgrades_failure() {
        let dir = TempDir::new().unwrap();
        let journal = open_journal(&dir);

        // An oversized payload makes the append fail; the public API must
        // swallow it and report "not journaled" instead of erroring.
        let mut huge = descriptor("huge");
        huge.body = json!("x".repeat(17 * 1024 * 1024));
        assert_eq!(journal.log_operation(&huge), None);
        assert!(journal.try_log_operation(&huge).is_err());

        // The journal stays usable.
        assert!(journal.log_operation(&descriptor("ok")).is_some());
        assert_eq!(journal.pending_operations(false).unwrap().len(), 1);
    }
}
