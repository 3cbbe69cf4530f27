//! Log header codec.
//!
//! The first [`LOG_HEADER_SIZE`](crate::LOG_HEADER_SIZE) bytes of the file
//! hold the format version and two recovery watermarks:
//!
//! ```text
//! +----------+----------------------+----------------------+
//! | version  | last_read_position   | last_write_position  |
//! | 4 bytes  | 8 bytes              | 8 bytes              |
//! +----------+----------------------+----------------------+
//! ```
//!
//! The header is written at log creation and rewritten only on clean
//! writer/reader close. Both positions are hints for resuming scans, not
//! ground truth; true state is re-derived by scanning forward from them.

use crate::error::WalError;
use crate::{FORMAT_VERSION, LOG_HEADER_SIZE};
use bytes::{BufMut, BytesMut};

/// The persisted log header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
    /// On-disk format version.
    pub version: u32,
    /// Position of the last record a reader marked as read.
    pub last_read_position: u64,
    /// Position of the last record the writer appended.
    pub last_write_position: u64,
}

impl LogHeader {
    /// Creates a fresh header with zeroed watermarks.
    pub fn new() -> Self {
        Self {
            version: FORMAT_VERSION,
            last_read_position: 0,
            last_write_position: 0,
        }
    }

    /// Encodes the header into its fixed-size on-disk form.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(LOG_HEADER_SIZE as usize);
        buf.put_u32(self.version);
        buf.put_u64(self.last_read_position);
        buf.put_u64(self.last_write_position);
        buf
    }

    /// Decodes and validates a header from the start of the file.
    pub fn decode(buf: &[u8]) -> Result<Self, WalError> {
        if buf.len() < LOG_HEADER_SIZE as usize {
            return Err(WalError::TruncatedHeader {
                size: buf.len() as u64,
                need: LOG_HEADER_SIZE,
            });
        }

        let version = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if version != FORMAT_VERSION {
            return Err(WalError::VersionMismatch {
                expected: FORMAT_VERSION,
                found: version,
            });
        }

        let last_read_position = u64::from_be_bytes([
            buf[4], buf[5], buf[6], buf[7], buf[8], buf[9], buf[10], buf[11],
        ]);
        let last_write_position = u64::from_be_bytes([
            buf[12], buf[13], buf[14], buf[15], buf[16], buf[17], buf[18], buf[19],
        ]);

        Ok(Self {
            version,
            last_read_position,
            last_write_position,
        })
    }
}

impl Default for LogHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = LogHeader {
            version: FORMAT_VERSION,
            last_read_position: 20,
            last_write_position: 4096,
        };

        let encoded = header.encode();
        assert_eq!(encoded.len(), LOG_HEADER_SIZE as usize);

        let decoded = LogHeader::decode(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_fresh_header() {
        let header = LogHeader::new();
        assert_eq!(header.version, FORMAT_VERSION);
        assert_eq!(header.last_read_position, 0);
        assert_eq!(header.last_write_position, 0);
    }

    #[test]
    fn test_truncated_header() {
        let result = LogHeader::decode(&[0u8; 12]);
        assert!(matches!(result, Err(WalError::TruncatedHeader { .. })));
    }

    #[test]
    fn test_version_mismatch() {
        let mut header = LogHeader::new();
        header.version = FORMAT_VERSION + 1;
        let encoded = header.encode();

        let result = LogHeader::decode(&encoded);
        assert!(matches!(
            result,
            Err(WalError::VersionMismatch { found, .. }) if found == FORMAT_VERSION + 1
        ));
    }
}
