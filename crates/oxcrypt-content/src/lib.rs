//! Block-level encrypted file content for overlay filesystems.
//!
//! Every plaintext file is split into 4 KiB blocks. Each block is sealed
//! independently with AES-256-GCM under a fresh random nonce, bound to its
//! position and to the file's random ID, and stored as one record in a
//! per-file container on the backing store:
//!
//! ```text
//! [header: version u16 BE | file id 16 B][nonce | ciphertext | tag]...
//! ```
//!
//! Blocks that were never written stay as sparse gaps in the container and
//! read back as zeros without touching the cipher.
//!
//! # Entry points
//!
//! - [`ContentEngine`]: handle-based API for a filesystem front end
//!   (`create`, `open`, `read`, `write`, `truncate`, `fallocate`, `release`,
//!   `unlink`).
//! - [`fs::ContentFile`]: one open container, usable without handles.
//! - [`fs::BlockCodec`]: the per-block AEAD codec.
//!
//! # Example
//!
//! ```
//! use oxcrypt_content::{ContentEngine, ContentKey, EngineConfig};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let key = ContentKey::random().unwrap();
//! let engine = ContentEngine::new(&key, EngineConfig::default()).unwrap();
//!
//! let fh = engine.create(&dir.path().join("doc.c")).unwrap();
//! engine.write(fh, 0, b"foo").unwrap();
//! engine.write(fh, 4096, b"foo").unwrap();
//!
//! let data = engine.read(fh, 0, 10_000).unwrap();
//! assert_eq!(data.len(), 4099);
//! assert_eq!(&data[4096..], b"foo");
//! engine.release(fh).unwrap();
//! ```

pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod fs;

pub use config::{ConfigError, EngineConfig};
pub use crypto::{CipherBackend, ContentKey};
pub use engine::{ContentEngine, EngineError};
pub use error::ErrorCategory;
pub use fs::{BlockState, ContentStat, FallocateMode};

#[cfg(feature = "async")]
pub use engine::ContentEngineAsync;
