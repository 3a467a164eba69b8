//! Per-file header: format version and random file ID.
//!
//! The header is written once, when the file first receives content, and the
//! file ID it carries is bound into the associated data of every block. A
//! block copied from another file therefore fails authentication.

use std::fmt;

use rand::RngCore;
use thiserror::Error;

use super::layout::HEADER_SIZE;

/// Current on-disk format version.
pub const CURRENT_VERSION: u16 = 2;

/// Size of the file ID in bytes.
pub const FILE_ID_SIZE: usize = 16;

/// Errors that can occur while parsing a file header.
///
/// All of these are fatal for the affected file: the engine never attempts
/// to guess or repair a damaged header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// The container ends inside the header.
    #[error("Header truncated: expected 18 bytes, got {actual}")]
    Truncated { actual: usize },

    /// **[INTEGRITY VIOLATION]** The header is entirely zero bytes.
    ///
    /// Produced by sparse regions or storage reservation at the start of a
    /// container that never had a header written.
    #[error("Header is all-zero")]
    AllZero,

    /// The header carries a format version this engine does not understand.
    #[error("Unsupported header version {found} (expected 2)")]
    UnsupportedVersion { found: u16 },
}

/// Random 128-bit identifier bound to one file instance.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId([u8; FILE_ID_SIZE]);

impl FileId {
    /// Generate a fresh file ID from the OS CSPRNG.
    pub fn random() -> Self {
        let mut id = [0u8; FILE_ID_SIZE];
        rand::rng().fill_bytes(&mut id);
        Self(id)
    }

    pub fn from_bytes(bytes: [u8; FILE_ID_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FILE_ID_SIZE] {
        &self.0
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", hex::encode(self.0))
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Decoded file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u16,
    pub file_id: FileId,
}

impl FileHeader {
    /// Create a header for a new file with a freshly generated ID.
    pub fn create() -> Self {
        Self {
            version: CURRENT_VERSION,
            file_id: FileId::random(),
        }
    }

    /// Serialize to the on-disk representation.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..2].copy_from_slice(&self.version.to_be_bytes());
        out[2..].copy_from_slice(self.file_id.as_bytes());
        out
    }

    /// Parse a header from the first bytes of a container.
    ///
    /// Extra trailing bytes are ignored so callers can pass a larger buffer.
    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        let Some(raw) = bytes.get(..HEADER_SIZE) else {
            return Err(HeaderError::Truncated {
                actual: bytes.len(),
            });
        };
        if raw.iter().all(|&b| b == 0) {
            return Err(HeaderError::AllZero);
        }

        let version = u16::from_be_bytes([raw[0], raw[1]]);
        if version != CURRENT_VERSION {
            return Err(HeaderError::UnsupportedVersion { found: version });
        }

        let mut id = [0u8; FILE_ID_SIZE];
        id.copy_from_slice(&raw[2..]);
        Ok(Self {
            version,
            file_id: FileId(id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = FileHeader::create();
        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), 18);
        assert_eq!(&bytes[..2], &[0, 2]);
        assert_eq!(&bytes[2..], header.file_id.as_bytes());
        assert_eq!(FileHeader::parse(&bytes), Ok(header));
    }

    #[test]
    fn test_fresh_ids_differ() {
        assert_ne!(FileHeader::create().file_id, FileHeader::create().file_id);
    }

    #[test]
    fn test_parse_ignores_trailing_bytes() {
        let header = FileHeader::create();
        let mut buf = header.to_bytes().to_vec();
        buf.extend_from_slice(&[0xAA; 40]);
        assert_eq!(FileHeader::parse(&buf), Ok(header));
    }

    #[test]
    fn test_parse_truncated() {
        let bytes = FileHeader::create().to_bytes();
        assert_eq!(
            FileHeader::parse(&bytes[..10]),
            Err(HeaderError::Truncated { actual: 10 })
        );
    }

    #[test]
    fn test_parse_all_zero() {
        assert_eq!(FileHeader::parse(&[0u8; 18]), Err(HeaderError::AllZero));
    }

    #[test]
    fn test_parse_wrong_version() {
        let mut bytes = FileHeader::create().to_bytes();
        bytes[1] = 1;
        assert_eq!(
            FileHeader::parse(&bytes),
            Err(HeaderError::UnsupportedVersion { found: 1 })
        );
    }

    #[test]
    fn test_file_id_debug_is_hex() {
        let id = FileId::from_bytes([0xAB; 16]);
        assert_eq!(format!("{id:?}"), format!("FileId({})", "ab".repeat(16)));
        assert_eq!(id.to_string(), "ab".repeat(16));
    }
}
