//! Transport-side consumer contract.
//!
//! The HTTP transport itself lives outside this crate; this module pins
//! down the seam it plugs into and the drain-then-send protocol it must
//! follow: replay everything pending before sending anything new, journal
//! the new operation, and acknowledge only on a definitive outcome.

use crate::descriptor::OperationDescriptor;
use crate::journal::RequestJournal;
use parking_lot::Mutex;
use std::collections::VecDeque;
use thiserror::Error;

/// A definitive, terminal outcome of sending an operation.
///
/// Both variants acknowledge the journal entry: the operation reached the
/// service and was decided. An outcome that is *unknown* (connection lost,
/// timeout) is a [`TransportError`] instead and leaves the entry pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The service accepted the operation.
    Success,
    /// The service returned a well-formed application error; retrying the
    /// same operation would fail the same way.
    ApplicationError { status: u16, message: String },
}

/// A transport failure with unknown outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out after {0} ms")]
    Timeout(u64),
}

/// The narrow interface through which the journal drives a transport.
pub trait OperationTransport {
    /// Sends one operation and reports either a terminal outcome or a
    /// transport failure.
    fn send(&mut self, descriptor: &OperationDescriptor) -> Result<SendOutcome, TransportError>;
}

/// Journals `descriptor`, sends it, and acknowledges on a terminal
/// outcome.
///
/// If journaling fails the send still proceeds (the downgrade in
/// [`RequestJournal::log_operation`]); if the outcome is unknown the
/// entry stays pending for a later replay.
fn send_journaled<T: OperationTransport>(
    journal: &RequestJournal,
    transport: &mut T,
    descriptor: &OperationDescriptor,
) -> Result<SendOutcome, TransportError> {
    let handle = journal.log_operation(descriptor);
    let result = transport.send(descriptor);
    if let (Some(position), Ok(_)) = (handle, &result) {
        journal.acknowledge(position);
    }
    result
}

/// Runs the drain-then-send protocol for one new operation.
///
/// All currently-pending operations are consumed from the journal and
/// re-attempted once, oldest first, through `transport`; each replay goes
/// through the same journal-send-acknowledge path, so a replay with an
/// unknown outcome is re-journaled and stays pending. Replay failures are
/// swallowed and never block the new send.
pub fn drain_then_send<T: OperationTransport>(
    journal: &RequestJournal,
    transport: &mut T,
    descriptor: &OperationDescriptor,
) -> Result<SendOutcome, TransportError> {
    match journal.pending_operations(true) {
        Ok(pending) => {
            for operation in pending {
                match send_journaled(journal, transport, &operation.descriptor) {
                    Ok(outcome) => {
                        tracing::debug!(
                            position = operation.position,
                            ?outcome,
                            "replayed pending operation"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            position = operation.position,
                            error = %e,
                            "replay failed, operation stays pending"
                        );
                    }
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not read pending operations, skipping replay");
        }
    }

    send_journaled(journal, transport, descriptor)
}

/// A scripted transport for tests.
///
/// Responses are served from a queue in order; once the script runs out,
/// every send succeeds. All sent descriptors are recorded.
#[derive(Debug, Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<SendOutcome, TransportError>>>,
    sent: Mutex<Vec<OperationDescriptor>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the outcome for the next unscripted send.
    pub fn push_response(&self, response: Result<SendOutcome, TransportError>) {
        self.script.lock().push_back(response);
    }

    /// Returns every descriptor sent so far, in order.
    pub fn sent(&self) -> Vec<OperationDescriptor> {
        self.sent.lock().clone()
    }
}

impl OperationTransport for MockTransport {
    fn send(&mut self, descriptor: &OperationDescriptor) -> Result<SendOutcome, TransportError> {
        self.sent.lock().push(descriptor.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or(Ok(SendOutcome::Success))
    }
}
