//! # replog-journal
//!
//! Request journal for the replog client SDK.
//!
//! Multiplexes two record kinds over one [`replog_wal`] log: a REQUEST
//! record is appended before an outbound operation is attempted, and a
//! RESPONSE record acknowledges it once a definitive outcome is known.
//! Operations whose REQUEST has no matching RESPONSE are *pending* and are
//! replayed by the transport before anything new is sent, so non-idempotent
//! calls survive crashes and restarts without duplication or silent loss.

pub mod descriptor;
pub mod error;
pub mod journal;
pub mod transport;

pub use descriptor::{Method, OperationDescriptor, ResponseKind, DESCRIPTOR_SCHEMA};
pub use error::JournalError;
pub use journal::{PendingOperation, RequestJournal, REQUEST, RESPONSE};
pub use transport::{drain_then_send, MockTransport, OperationTransport, SendOutcome, TransportError};
