//! Record framing.
//!
//! Each record has the following on-disk format:
//!
//! ```text
//! +----------+----------+----------+----------+---------------------+
//! | flags    | type     | reserved | length   | reference           |
//! | 1 byte   | 1 byte   | 2 bytes  | 4 bytes  | 8 bytes (signed)    |
//! +----------+----------+----------+----------+---------------------+
//! | payload                                                         |
//! | length bytes                                                    |
//! +-----------------------------------------------------------------+
//! ```
//!
//! All integers are big-endian. The flags byte is the first byte of the
//! record, so marking a record as garbage is a single positioned write at
//! the record's own offset (see [`crate::log::Log::mark_garbage`]).
//!
//! Offset 0 of the file is reserved for the log header and is never a
//! valid record start; decoding at offset 0 always yields "no record".
//!
//! Record type 0 is reserved and rejected at encode time. An all-zero
//! header is the end-of-stream sentinel, and a record with type 0, a
//! zero reference, and an empty payload would encode to exactly that.

use crate::error::WalError;
use crate::RECORD_HEADER_SIZE;
use bytes::{BufMut, Bytes, BytesMut};
use std::io::{ErrorKind, Read};

/// Flag bit 0: the record has been processed/acknowledged by a reader.
pub const FLAG_GARBAGE: u8 = 0b0000_0001;

/// Reference value for records that do not point at another record.
pub const NO_REFERENCE: i64 = -1;

/// Maximum record payload size (16 MiB).
pub const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

/// A single framed entry in the log.
///
/// Identified by `position`, its own starting byte offset in the file,
/// which doubles as the caller's correlation handle. Immutable on disk
/// except for the garbage bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Flag bits; bit 0 is the garbage bit.
    pub flags: u8,
    /// Caller-defined type tag (the journal reserves 1 and 2).
    pub record_type: u8,
    /// Position of another record this one refers to, or [`NO_REFERENCE`].
    pub reference: i64,
    /// Opaque payload bytes.
    pub payload: Bytes,
    /// Starting byte offset of this record in the file.
    pub position: u64,
}

impl Record {
    /// Creates a record with clear flags, positioned at `position`.
    pub fn new(record_type: u8, reference: i64, payload: Bytes, position: u64) -> Self {
        Self {
            flags: 0,
            record_type,
            reference,
            payload,
            position,
        }
    }

    /// Returns whether the garbage bit is set.
    pub fn is_garbage(&self) -> bool {
        self.flags & FLAG_GARBAGE != 0
    }

    /// Returns the total size of this record on disk.
    pub fn disk_size(&self) -> usize {
        RECORD_HEADER_SIZE + self.payload.len()
    }

    /// Encodes the record header and payload into bytes.
    ///
    /// Record type 0 is rejected: its frame could be indistinguishable
    /// from the all-zero end-of-stream sentinel, cutting off every
    /// record appended after it.
    pub fn encode(&self) -> Result<BytesMut, WalError> {
        if self.record_type == 0 {
            return Err(WalError::InvalidHeader {
                offset: self.position,
                reason: "record type 0 is reserved".to_string(),
            });
        }
        if self.payload.len() > MAX_RECORD_SIZE {
            return Err(WalError::RecordTooLarge {
                size: self.payload.len(),
                max: MAX_RECORD_SIZE,
            });
        }

        let mut buf = BytesMut::with_capacity(self.disk_size());

        // Flags (1 byte)
        buf.put_u8(self.flags);

        // Type (1 byte)
        buf.put_u8(self.record_type);

        // Reserved (2 bytes)
        buf.put_u16(0);

        // Payload length (4 bytes)
        buf.put_u32(self.payload.len() as u32);

        // Reference (8 bytes, signed)
        buf.put_i64(self.reference);

        // Payload
        buf.put_slice(&self.payload);

        Ok(buf)
    }

    /// Decodes the record starting at `position` from a reader positioned
    /// there.
    ///
    /// Returns `Ok(None)` at clean end-of-stream: when `position` is the
    /// reserved header slot (offset 0), when nothing is left to read, or
    /// when the remaining bytes are all zero. A short or overrunning header
    /// containing non-zero bytes is a format error, not end-of-stream.
    pub fn decode<R: Read>(reader: &mut R, position: u64) -> Result<Option<Self>, WalError> {
        if position == 0 {
            // The log header lives here; it must never be parsed as a record.
            return Ok(None);
        }

        let mut header = [0u8; RECORD_HEADER_SIZE];
        let mut filled = 0;
        while filled < RECORD_HEADER_SIZE {
            match reader.read(&mut header[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            return Ok(None);
        }
        if header[..filled].iter().all(|&b| b == 0) {
            // Zero padding at the tail, same as no data.
            return Ok(None);
        }
        if filled < RECORD_HEADER_SIZE {
            return Err(WalError::InvalidHeader {
                offset: position,
                reason: format!(
                    "truncated record header: {} of {} bytes",
                    filled, RECORD_HEADER_SIZE
                ),
            });
        }

        let flags = header[0];
        let record_type = header[1];
        if record_type == 0 {
            // Not all-zero (handled above), yet carrying the reserved type.
            return Err(WalError::InvalidHeader {
                offset: position,
                reason: "record type 0 is reserved".to_string(),
            });
        }
        // reserved: header[2..4]
        let payload_len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let reference = i64::from_be_bytes([
            header[8], header[9], header[10], header[11], header[12], header[13], header[14],
            header[15],
        ]);

        if payload_len > MAX_RECORD_SIZE {
            return Err(WalError::RecordTooLarge {
                size: payload_len,
                max: MAX_RECORD_SIZE,
            });
        }

        let mut payload = vec![0u8; payload_len];
        if let Err(e) = reader.read_exact(&mut payload) {
            return if e.kind() == ErrorKind::UnexpectedEof {
                Err(WalError::InvalidHeader {
                    offset: position,
                    reason: format!("payload of {} bytes extends past end of file", payload_len),
                })
            } else {
                Err(e.into())
            };
        }

        Ok(Some(Self {
            flags,
            record_type,
            reference,
            payload: Bytes::from(payload),
            position,
        }))
    }
}
