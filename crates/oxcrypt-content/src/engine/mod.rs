//! Handle-based content engine.
//!
//! [`ContentEngine`] is what a protocol front end holds. It owns the keyed
//! block codec and two tables:
//!
//! - an open-file table keyed by backing device and inode, so every handle on
//!   the same container shares one [`ContentFile`] (one cached header, one
//!   lock);
//! - a handle table mapping front-end handle IDs to those shared files.
//!
//! An entry in the open-file table lives exactly as long as some handle
//! refers to it. Each entry counts its handles; the count only changes under
//! the table's entry lock, so the entry goes away with its last release even
//! while other threads still run operations on the file.

mod handles;

#[cfg(feature = "async")]
mod async_ops;

pub use handles::HandleTable;

#[cfg(feature = "async")]
pub use async_ops::ContentEngineAsync;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::EngineConfig;
use crate::crypto::{CipherError, ContentKey};
use crate::error::{ErrorCategory, content_error_to_errno, io_error_to_errno};
use crate::fs::{
    BlockCodec, BlockState, CipherFile, ContentContext, ContentError, ContentFile, ContentStat,
    ContentStats, ContentStatsSnapshot, FallocateMode, FileKey,
};

/// Errors returned by [`ContentEngine`].
#[derive(Error, Debug)]
pub enum EngineError {
    /// A content operation failed
    #[error(transparent)]
    Content(Box<ContentError>),

    /// The handle was never issued or has been released
    #[error("Invalid file handle {handle}")]
    InvalidHandle { handle: u64 },

    /// A path-level operation on the backing store failed
    #[error("IO error at {}: {source}", .path.display())]
    Io {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// The content key could not be bound to a cipher
    #[error("Cipher setup failed: {0}")]
    Cipher(#[from] CipherError),

    /// A blocking task of the async facade did not complete
    #[error("Blocking task failed: {0}")]
    TaskJoin(String),
}

impl From<ContentError> for EngineError {
    fn from(e: ContentError) -> Self {
        EngineError::Content(Box::new(e))
    }
}

impl EngineError {
    /// POSIX errno to report to the front end.
    pub fn to_errno(&self) -> i32 {
        match self {
            EngineError::Content(e) => content_error_to_errno(e),
            EngineError::Io { source, .. } if source.raw_os_error().is_some() => {
                io_error_to_errno(source)
            }
            other => ErrorCategory::from(other).to_errno(),
        }
    }
}

/// An open-file table entry.
#[derive(Debug)]
struct OpenFile {
    file: Arc<ContentFile>,
    handles: usize,
}

/// An issued handle: the shared file plus the key it is filed under.
#[derive(Debug, Clone)]
struct OpenHandle {
    key: FileKey,
    file: Arc<ContentFile>,
}

/// Encrypted content engine over a local backing store.
///
/// # Example
///
/// ```
/// use oxcrypt_content::{ContentEngine, ContentKey, EngineConfig};
///
/// let dir = tempfile::tempdir().unwrap();
/// let engine = ContentEngine::new(&ContentKey::random().unwrap(), EngineConfig::default()).unwrap();
///
/// let fh = engine.create(&dir.path().join("notes.c")).unwrap();
/// engine.write(fh, 0, b"hello").unwrap();
/// assert_eq!(engine.read(fh, 0, 4096).unwrap(), b"hello");
/// engine.release(fh).unwrap();
/// ```
pub struct ContentEngine {
    config: EngineConfig,
    codec: Arc<BlockCodec>,
    stats: Arc<ContentStats>,
    files: DashMap<FileKey, OpenFile>,
    handles: HandleTable<OpenHandle>,
}

impl std::fmt::Debug for ContentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentEngine")
            .field("config", &self.config)
            .field("open_files", &self.files.len())
            .field("open_handles", &self.handles.len())
            .finish_non_exhaustive()
    }
}

impl ContentEngine {
    /// Create an engine that encrypts with `key`.
    ///
    /// The key is bound to the configured cipher once; `key` itself is not
    /// retained.
    pub fn new(key: &ContentKey, config: EngineConfig) -> Result<Self, EngineError> {
        let codec = Arc::new(BlockCodec::new(key, config.cipher)?);
        info!(cipher = %config.cipher, "Content engine initialized");
        Ok(Self {
            config,
            codec,
            stats: Arc::new(ContentStats::new()),
            files: DashMap::new(),
            handles: HandleTable::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create an empty container at `path` and open it.
    ///
    /// Fails with `EEXIST` if `path` already exists.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn create(&self, path: &Path) -> Result<u64, EngineError> {
        let store = CipherFile::create(path).map_err(|source| EngineError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        self.register(path, store)
    }

    /// Open an existing container.
    ///
    /// A non-empty container has its header validated here.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn open(&self, path: &Path) -> Result<u64, EngineError> {
        let store = CipherFile::open(path).map_err(|source| EngineError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        self.register(path, store)
    }

    fn register(&self, path: &Path, store: CipherFile) -> Result<u64, EngineError> {
        let key = store.identity().map_err(|source| EngineError::Io {
            source,
            path: path.to_path_buf(),
        })?;

        let file = match self.files.entry(key) {
            Entry::Occupied(mut entry) => {
                let open = entry.get_mut();
                open.handles += 1;
                Arc::clone(&open.file)
            }
            Entry::Vacant(entry) => {
                let file = Arc::new(ContentFile::from_store(
                    path,
                    store,
                    Arc::clone(&self.codec),
                    Arc::clone(&self.stats),
                    &self.config,
                )?);
                entry.insert(OpenFile {
                    file: Arc::clone(&file),
                    handles: 1,
                });
                file
            }
        };

        let fh = self.handles.insert(OpenHandle { key, file });
        debug!(fh, dev = key.dev, ino = key.ino, "Opened handle");
        Ok(fh)
    }

    fn file(&self, fh: u64) -> Result<Arc<ContentFile>, EngineError> {
        self.handles
            .get(fh)
            .map(|h| h.file)
            .ok_or(EngineError::InvalidHandle { handle: fh })
    }

    #[instrument(level = "trace", skip(self))]
    pub fn read(&self, fh: u64, offset: u64, len: usize) -> Result<Vec<u8>, EngineError> {
        Ok(self.file(fh)?.read(offset, len)?)
    }

    #[instrument(level = "trace", skip(self, data), fields(len = data.len()))]
    pub fn write(&self, fh: u64, offset: u64, data: &[u8]) -> Result<usize, EngineError> {
        Ok(self.file(fh)?.write(offset, data)?)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn truncate(&self, fh: u64, size: u64) -> Result<(), EngineError> {
        Ok(self.file(fh)?.truncate(size)?)
    }

    /// `fallocate(2)` with the raw Linux mode flags.
    ///
    /// Only the default mode and `FALLOC_FL_KEEP_SIZE` are implemented; any
    /// other flag fails with `EOPNOTSUPP`.
    #[instrument(level = "debug", skip(self))]
    pub fn fallocate(&self, fh: u64, offset: u64, len: u64, flags: i32) -> Result<(), EngineError> {
        let file = self.file(fh)?;
        let Some(mode) = FallocateMode::from_flags(flags) else {
            return Err(ContentError::Unsupported {
                flags,
                context: ContentContext::new()
                    .with_path(file.path())
                    .with_operation("fallocate"),
            }
            .into());
        };
        Ok(file.allocate(offset, len, mode)?)
    }

    pub fn stat(&self, fh: u64) -> Result<ContentStat, EngineError> {
        Ok(self.file(fh)?.stat()?)
    }

    /// Physical state of the blocks overlapping `[offset, offset + len)`.
    pub fn block_states(
        &self,
        fh: u64,
        offset: u64,
        len: u64,
    ) -> Result<Vec<(u64, BlockState)>, EngineError> {
        Ok(self.file(fh)?.block_states(offset, len)?)
    }

    pub fn fsync(&self, fh: u64) -> Result<(), EngineError> {
        Ok(self.file(fh)?.sync()?)
    }

    /// Release a handle. The shared file entry is dropped with its last handle.
    #[instrument(level = "debug", skip(self))]
    pub fn release(&self, fh: u64) -> Result<(), EngineError> {
        let handle = self
            .handles
            .remove(fh)
            .ok_or(EngineError::InvalidHandle { handle: fh })?;
        let key = handle.key;

        if let Entry::Occupied(mut entry) = self.files.entry(key) {
            let open = entry.get_mut();
            open.handles = open.handles.saturating_sub(1);
            if open.handles == 0 {
                entry.remove();
                debug!(dev = key.dev, ino = key.ino, "Closed last handle on file");
            }
        }
        Ok(())
    }

    /// Remove the container at `path`.
    ///
    /// Handles still open on it keep working on the unlinked file until
    /// released.
    #[instrument(level = "debug", skip(self), fields(path = %path.display()))]
    pub fn unlink(&self, path: &Path) -> Result<(), EngineError> {
        std::fs::remove_file(path).map_err(|source| EngineError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        debug!("Removed container");
        Ok(())
    }

    /// Snapshot of engine-wide I/O counters.
    pub fn stats(&self) -> ContentStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of distinct backing files currently open.
    pub fn open_files(&self) -> usize {
        self.files.len()
    }

    /// Number of handles currently issued.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn engine() -> ContentEngine {
        let key = ContentKey::new([0x11; 32]).unwrap();
        ContentEngine::new(&key, EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_handles_share_open_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shared.c");
        let engine = engine();

        let a = engine.create(&path).unwrap();
        let b = engine.open(&path).unwrap();
        assert_ne!(a, b);
        assert_eq!(engine.open_files(), 1);
        assert_eq!(engine.open_handles(), 2);

        engine.write(a, 0, b"via a").unwrap();
        assert_eq!(engine.read(b, 0, 100).unwrap(), b"via a");

        engine.release(a).unwrap();
        assert_eq!(engine.open_files(), 1);
        engine.release(b).unwrap();
        assert_eq!(engine.open_files(), 0);
        assert_eq!(engine.open_handles(), 0);
    }

    #[test]
    fn test_release_during_operation_drops_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("busy.c");
        let engine = engine();
        let fh = engine.create(&path).unwrap();
        engine.write(fh, 0, b"busy").unwrap();

        // An operation in flight holds its own reference to the file
        let in_flight = engine.file(fh).unwrap();
        engine.release(fh).unwrap();
        assert_eq!(engine.open_files(), 0);
        assert_eq!(in_flight.read(0, 100).unwrap(), b"busy");
        drop(in_flight);

        // Reopening builds a fresh entry
        let fh = engine.open(&path).unwrap();
        assert_eq!(engine.open_files(), 1);
        engine.release(fh).unwrap();
        assert_eq!(engine.open_files(), 0);
    }

    #[test]
    fn test_invalid_handle() {
        let engine = engine();
        let err = engine.read(99, 0, 1).unwrap_err();
        assert!(matches!(err, EngineError::InvalidHandle { handle: 99 }));
        assert_eq!(err.to_errno(), libc::EBADF);
        assert!(matches!(
            engine.release(0),
            Err(EngineError::InvalidHandle { handle: 0 })
        ));
    }

    #[test]
    fn test_release_twice_fails() {
        let dir = TempDir::new().unwrap();
        let engine = engine();
        let fh = engine.create(&dir.path().join("f.c")).unwrap();
        engine.release(fh).unwrap();
        assert_eq!(engine.release(fh).unwrap_err().to_errno(), libc::EBADF);
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.c");
        let engine = engine();
        engine.create(&path).unwrap();
        assert_eq!(engine.create(&path).unwrap_err().to_errno(), libc::EEXIST);
    }

    #[test]
    fn test_open_missing_fails() {
        let dir = TempDir::new().unwrap();
        let err = engine().open(&dir.path().join("missing.c")).unwrap_err();
        assert_eq!(err.to_errno(), libc::ENOENT);
    }

    #[test]
    fn test_unsupported_fallocate_mode() {
        let dir = TempDir::new().unwrap();
        let engine = engine();
        let fh = engine.create(&dir.path().join("f.c")).unwrap();
        // FALLOC_FL_PUNCH_HOLE | FALLOC_FL_KEEP_SIZE
        let err = engine.fallocate(fh, 0, 10, 0x03).unwrap_err();
        assert_eq!(err.to_errno(), libc::EOPNOTSUPP);
        assert_eq!(engine.stat(fh).unwrap().plaintext_size, 0);
    }

    #[test]
    fn test_unlinked_file_stays_usable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.c");
        let engine = engine();
        let fh = engine.create(&path).unwrap();
        engine.write(fh, 0, b"still here").unwrap();

        engine.unlink(&path).unwrap();
        assert!(!path.exists());
        assert_eq!(engine.read(fh, 0, 100).unwrap(), b"still here");
        engine.release(fh).unwrap();
        assert_eq!(engine.open_files(), 0);

        assert_eq!(engine.unlink(&path).unwrap_err().to_errno(), libc::ENOENT);
    }
}
