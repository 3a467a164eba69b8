//! Content I/O on one open container.
//!
//! [`ContentFile`] maps plaintext byte ranges onto block records: reads
//! decrypt only the blocks they touch, partial-block writes go through
//! read-modify-write, and truncate/fallocate keep skipped regions as holes.
//!
//! # Locking
//!
//! Each public operation takes the file's [`ContentLock`] once and then works
//! through `*_locked` helpers that assume the lock is held. Reads are shared;
//! writes, truncate and fallocate are exclusive for their whole duration.
//!
//! # Header lifecycle
//!
//! An empty file has no header. The first mutation writes one with a fresh
//! file ID, and truncating to zero removes it again so the next write starts
//! over with a new ID.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use super::block::{BlockCodec, BlockError};
use super::header::{FileHeader, FileId, HeaderError};
use super::holes::{self, BlockState, GrowPlan, GrowTail};
use super::layout::{
    BLOCK_SIZE, CIPHER_BLOCK_SIZE, HEADER_SIZE, MAX_PLAINTEXT_SIZE, block_to_encrypted_offset,
    encrypted_to_plaintext_size, explode_range, joint_encrypted_range, plaintext_to_block_number,
};
use super::lock::ContentLock;
use super::stats::ContentStats;
use super::store::{self, CipherFile, FileKey};
use crate::config::EngineConfig;

// ============================================================================
// Error Types
// ============================================================================

/// Context for content operations.
#[derive(Debug, Clone, Default)]
pub struct ContentContext {
    /// Path to the container
    pub path: Option<PathBuf>,
    /// Block being processed
    pub block_no: Option<u64>,
    /// Operation being performed
    pub operation: Option<&'static str>,
}

impl ContentContext {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_block(mut self, block_no: u64) -> Self {
        self.block_no = Some(block_no);
        self
    }

    #[must_use]
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        self.operation = Some(operation);
        self
    }
}

impl std::fmt::Display for ContentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();

        if let Some(op) = self.operation {
            parts.push(op.to_string());
        }
        if let Some(ref path) = self.path {
            parts.push(format!("at {:?}", path.display()));
        }
        if let Some(block) = self.block_no {
            parts.push(format!("block {block}"));
        }

        if parts.is_empty() {
            write!(f, "(no context)")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Coarse classification of a [`ContentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorKind {
    /// A block record failed authentication or is malformed.
    Authentication,
    /// The header or container size is invalid.
    Format,
    /// The backing store failed.
    Resource,
    /// A caller or internal precondition was broken.
    InvariantViolation,
    /// The requested mode is not implemented.
    Unsupported,
}

/// Errors that can occur during content operations.
#[derive(Error, Debug)]
pub enum ContentError {
    /// Backing store I/O failed
    #[error("IO error during {context}: {source}")]
    Io {
        #[source]
        source: io::Error,
        context: ContentContext,
    },

    /// A block could not be encoded or decoded
    #[error("Block error during {context}: {source}")]
    Block {
        #[source]
        source: BlockError,
        context: ContentContext,
    },

    /// **[INTEGRITY VIOLATION]** The file header is missing or damaged
    #[error("Invalid header for {context}: {source}")]
    Header {
        #[source]
        source: HeaderError,
        context: ContentContext,
    },

    /// **[INTEGRITY VIOLATION]** The container length cannot be produced by
    /// any sequence of writes
    #[error("Invalid container size {size} for {context}")]
    CorruptSize { size: u64, context: ContentContext },

    /// fallocate mode flags other than default and keep-size
    #[error("Unsupported fallocate mode {flags:#x} for {context}")]
    Unsupported { flags: i32, context: ContentContext },

    /// A precondition was violated by the caller
    #[error("Invariant violated during {context}: {reason}")]
    InvariantViolation {
        reason: String,
        context: ContentContext,
    },
}

impl ContentError {
    pub fn kind(&self) -> ContentErrorKind {
        match self {
            ContentError::Io { .. } => ContentErrorKind::Resource,
            ContentError::Block { source, .. } if source.is_integrity_violation() => {
                ContentErrorKind::Authentication
            }
            ContentError::Block {
                source: BlockError::Encryption { .. },
                ..
            } => ContentErrorKind::Resource,
            ContentError::Block { .. } | ContentError::InvariantViolation { .. } => {
                ContentErrorKind::InvariantViolation
            }
            ContentError::Header { .. } | ContentError::CorruptSize { .. } => {
                ContentErrorKind::Format
            }
            ContentError::Unsupported { .. } => ContentErrorKind::Unsupported,
        }
    }

    /// The block number involved, if the error concerns a single block.
    pub fn block_no(&self) -> Option<u64> {
        match self {
            ContentError::Block { source, .. } => Some(source.block_no()),
            ContentError::Io { context, .. } => context.block_no,
            _ => None,
        }
    }
}

// ============================================================================
// Operation Types
// ============================================================================

/// Linux `fallocate` flag requesting reservation without a size change.
pub const FALLOC_FL_KEEP_SIZE: i32 = 0x01;

/// Supported fallocate modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallocateMode {
    /// Reserve storage and grow the file if the range ends past EOF.
    Default,
    /// Reserve storage only; the logical size never changes.
    KeepSize,
}

impl FallocateMode {
    /// Parse the raw Linux flag word. Any flag other than
    /// `FALLOC_FL_KEEP_SIZE` (punch hole, zero range, collapse...) is rejected.
    pub fn from_flags(flags: i32) -> Option<Self> {
        match flags {
            0 => Some(Self::Default),
            FALLOC_FL_KEEP_SIZE => Some(Self::KeepSize),
            _ => None,
        }
    }
}

/// Size information for one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentStat {
    /// Logical plaintext length.
    pub plaintext_size: u64,
    /// Container length on the backing store.
    pub ciphertext_size: u64,
    /// Storage actually allocated to the container by the backing filesystem.
    pub allocated_bytes: u64,
}

/// Overlay `new` onto `old` at `offset`, growing `old` with zeros if needed.
fn merge_block(old: &mut Vec<u8>, new: &[u8], offset: usize) {
    let end = offset + new.len();
    if old.len() < end {
        old.resize(end, 0);
    }
    old[offset..end].copy_from_slice(new);
}

// ============================================================================
// ContentFile
// ============================================================================

/// One open encrypted container.
///
/// Thread-safe: share it behind an `Arc` between every handle opened on the
/// same backing file so they serialize on the same lock.
///
/// # Example
///
/// ```
/// # use std::sync::Arc;
/// # use oxcrypt_content::{ContentKey, EngineConfig};
/// # use oxcrypt_content::fs::{BlockCodec, ContentFile, ContentStats};
/// let dir = tempfile::tempdir().unwrap();
/// let key = ContentKey::random().unwrap();
/// let config = EngineConfig::default();
/// let codec = Arc::new(BlockCodec::new(&key, config.cipher).unwrap());
/// let file = ContentFile::create(
///     &dir.path().join("file.c"),
///     codec,
///     Arc::new(ContentStats::new()),
///     &config,
/// )
/// .unwrap();
///
/// file.write(4096, b"foo").unwrap();
/// assert_eq!(file.plaintext_size().unwrap(), 4099);
/// assert_eq!(file.read(4096, 100).unwrap(), b"foo");
/// ```
pub struct ContentFile {
    path: PathBuf,
    store: CipherFile,
    codec: Arc<BlockCodec>,
    stats: Arc<ContentStats>,
    lock: ContentLock,
    header: Mutex<Option<FileHeader>>,
    preallocate: bool,
    reservation_unsupported: AtomicBool,
    parallel_threshold: usize,
}

impl std::fmt::Debug for ContentFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentFile")
            .field("path", &self.path)
            .field("header", &*self.header.lock())
            .finish_non_exhaustive()
    }
}

impl ContentFile {
    /// Open an existing container.
    ///
    /// A non-empty container has its header validated immediately, so a
    /// damaged header fails here rather than on first read.
    pub fn open(
        path: &Path,
        codec: Arc<BlockCodec>,
        stats: Arc<ContentStats>,
        config: &EngineConfig,
    ) -> Result<Self, ContentError> {
        let store = CipherFile::open(path).map_err(|source| ContentError::Io {
            source,
            context: ContentContext::new().with_path(path).with_operation("open"),
        })?;
        Self::from_store(path, store, codec, stats, config)
    }

    /// Create a new empty container. Fails if `path` exists.
    pub fn create(
        path: &Path,
        codec: Arc<BlockCodec>,
        stats: Arc<ContentStats>,
        config: &EngineConfig,
    ) -> Result<Self, ContentError> {
        let store = CipherFile::create(path).map_err(|source| ContentError::Io {
            source,
            context: ContentContext::new().with_path(path).with_operation("create"),
        })?;
        Self::from_store(path, store, codec, stats, config)
    }

    /// Wrap an already opened container.
    pub fn from_store(
        path: &Path,
        store: CipherFile,
        codec: Arc<BlockCodec>,
        stats: Arc<ContentStats>,
        config: &EngineConfig,
    ) -> Result<Self, ContentError> {
        let file = Self {
            path: path.to_path_buf(),
            store,
            codec,
            lock: ContentLock::new(Arc::clone(&stats)),
            stats,
            header: Mutex::new(None),
            preallocate: config.preallocate,
            reservation_unsupported: AtomicBool::new(false),
            parallel_threshold: config.parallel_threshold.max(1),
        };
        file.load_header()?;
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Device and inode of the backing container.
    pub fn identity(&self) -> Result<FileKey, ContentError> {
        self.store
            .identity()
            .map_err(|e| self.io_error(e, "identity"))
    }

    /// The cached file ID, if a header has been loaded or created.
    pub fn file_id(&self) -> Option<FileId> {
        self.header.lock().map(|h| h.file_id)
    }

    /// Read up to `len` bytes at `offset`.
    ///
    /// Returns fewer bytes when the range extends past EOF, and an empty
    /// buffer when `offset` is at or beyond EOF.
    #[instrument(level = "trace", skip(self), fields(path = %self.path.display()))]
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, ContentError> {
        let _guard = self.lock.shared();
        let size = self.plaintext_size_locked()?;
        if offset >= size {
            return Ok(Vec::new());
        }
        self.read_locked(offset, (len as u64).min(size - offset))
    }

    /// Write `data` at `offset`, growing the file if needed.
    ///
    /// Returns the number of bytes written, which is always `data.len()`.
    #[instrument(level = "debug", skip(self, data), fields(path = %self.path.display(), len = data.len()))]
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<usize, ContentError> {
        if data.is_empty() {
            return Ok(0);
        }
        self.check_range(offset, data.len() as u64, "write")?;
        let _guard = self.lock.exclusive();
        let size = self.plaintext_size_locked()?;
        if let Some(fill) = holes::padding_before_write(size, offset) {
            trace!(offset = fill.offset, len = fill.len, "Padding old tail before write");
            self.write_locked(fill.offset, &vec![0u8; fill.len])?;
        }
        self.write_locked(offset, data)
    }

    /// Set the logical size to `new_size`.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn truncate(&self, new_size: u64) -> Result<(), ContentError> {
        self.check_range(new_size, 0, "truncate")?;
        let _guard = self.lock.exclusive();
        self.truncate_locked(new_size)
    }

    /// Reserve storage for `[offset, offset + len)` and, unless `mode` is
    /// [`FallocateMode::KeepSize`], grow the file to cover the range.
    ///
    /// Never shrinks the file and never changes existing content.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn allocate(&self, offset: u64, len: u64, mode: FallocateMode) -> Result<(), ContentError> {
        if len == 0 {
            return Err(ContentError::InvariantViolation {
                reason: format!("empty allocation range at offset {offset}"),
                context: self.context("fallocate"),
            });
        }
        let end = self.check_range(offset, len, "fallocate")?;
        let _guard = self.lock.exclusive();

        if let Some((start, reserve_len)) = holes::reservation_range(offset, len) {
            self.store
                .reserve(start, reserve_len)
                .map_err(|e| self.io_error(e, "fallocate"))?;
            debug!(start, reserve_len, "Reserved container storage");
        }
        if mode == FallocateMode::KeepSize {
            return Ok(());
        }

        let old_size = self.plaintext_size_locked()?;
        if end <= old_size {
            return Ok(());
        }
        self.grow_locked(old_size, end)
    }

    /// Logical plaintext size derived from the container length.
    pub fn plaintext_size(&self) -> Result<u64, ContentError> {
        let _guard = self.lock.shared();
        self.plaintext_size_locked()
    }

    pub fn stat(&self) -> Result<ContentStat, ContentError> {
        let _guard = self.lock.shared();
        let ciphertext_size = self.store.len().map_err(|e| self.io_error(e, "stat"))?;
        let plaintext_size = encrypted_to_plaintext_size(ciphertext_size)
            .ok_or_else(|| self.corrupt_size(ciphertext_size))?;
        let allocated_bytes = self
            .store
            .allocated_bytes()
            .map_err(|e| self.io_error(e, "stat"))?;
        Ok(ContentStat {
            plaintext_size,
            ciphertext_size,
            allocated_bytes,
        })
    }

    /// Physical state of every block overlapping `[offset, offset + len)`,
    /// limited to the current file size.
    pub fn block_states(
        &self,
        offset: u64,
        len: u64,
    ) -> Result<Vec<(u64, BlockState)>, ContentError> {
        let _guard = self.lock.shared();
        let size = self.plaintext_size_locked()?;
        if offset >= size || len == 0 {
            return Ok(Vec::new());
        }
        let last_byte = offset + len.min(size - offset) - 1;

        let mut record = vec![0u8; CIPHER_BLOCK_SIZE];
        (plaintext_to_block_number(offset)..=plaintext_to_block_number(last_byte))
            .map(|block_no| -> Result<_, ContentError> {
                let n = self
                    .store
                    .read_at(&mut record, block_to_encrypted_offset(block_no))
                    .map_err(|e| self.io_error(e, "block_states"))?;
                Ok((block_no, holes::classify_record(&record[..n])))
            })
            .collect()
    }

    /// Flush written blocks to stable storage.
    pub fn sync(&self) -> Result<(), ContentError> {
        let _guard = self.lock.shared();
        self.store.sync_data().map_err(|e| self.io_error(e, "sync"))
    }

    // ------------------------------------------------------------------------
    // Header handling
    // ------------------------------------------------------------------------

    /// Return the cached file ID, reading the header on first use.
    ///
    /// `None` means the container is empty.
    fn load_header(&self) -> Result<Option<FileId>, ContentError> {
        let mut cached = self.header.lock();
        if let Some(header) = *cached {
            return Ok(Some(header.file_id));
        }

        let mut buf = [0u8; HEADER_SIZE];
        let n = self
            .store
            .read_at(&mut buf, 0)
            .map_err(|e| self.io_error(e, "read_header"))?;
        if n == 0 {
            return Ok(None);
        }

        let header = FileHeader::parse(&buf[..n]).map_err(|source| {
            warn!(path = %self.path.display(), error = %source, "Invalid file header");
            ContentError::Header {
                source,
                context: self.context("read_header"),
            }
        })?;
        *cached = Some(header);
        trace!(file_id = %header.file_id, "Loaded file header");
        Ok(Some(header.file_id))
    }

    /// Return the file ID, writing a fresh header if the container is empty.
    ///
    /// The flag is true if the header was created by this call.
    fn ensure_header(&self) -> Result<(FileId, bool), ContentError> {
        if let Some(file_id) = self.load_header()? {
            return Ok((file_id, false));
        }
        let header = FileHeader::create();
        self.store
            .write_all_at(&header.to_bytes(), 0)
            .map_err(|e| self.io_error(e, "write_header"))?;
        *self.header.lock() = Some(header);
        debug!(file_id = %header.file_id, "Created file header");
        Ok((header.file_id, true))
    }

    /// Drop the header of a file that must become empty again.
    fn discard_header(&self) -> Result<(), ContentError> {
        self.store
            .set_len(0)
            .map_err(|e| self.io_error(e, "discard_header"))?;
        *self.header.lock() = None;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Locked helpers
    // ------------------------------------------------------------------------

    fn plaintext_size_locked(&self) -> Result<u64, ContentError> {
        let size = self.store.len().map_err(|e| self.io_error(e, "stat"))?;
        encrypted_to_plaintext_size(size).ok_or_else(|| self.corrupt_size(size))
    }

    fn read_records(&self, offset: u64, len: u64) -> Result<Vec<u8>, ContentError> {
        let len = usize::try_from(len).map_err(|_| ContentError::InvariantViolation {
            reason: format!("read of {len} bytes exceeds address space"),
            context: self.context("read"),
        })?;
        let mut records = vec![0u8; len];
        let n = self
            .store
            .read_at(&mut records, offset)
            .map_err(|e| self.io_error(e, "read"))?;
        records.truncate(n);
        Ok(records)
    }

    fn read_locked(&self, offset: u64, len: u64) -> Result<Vec<u8>, ContentError> {
        let spans = explode_range(offset, len);
        let Some((cipher_offset, cipher_len)) = joint_encrypted_range(&spans) else {
            return Ok(Vec::new());
        };
        let Some(file_id) = self.load_header()? else {
            return Ok(Vec::new());
        };

        let records = self.read_records(cipher_offset, cipher_len)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let first_block = spans[0].block_no;
        let mut plaintext = Vec::with_capacity(records.len());
        for (i, record) in records.chunks(CIPHER_BLOCK_SIZE).enumerate() {
            let block_no = first_block + i as u64;
            if holes::is_hole(record) {
                self.stats.record_hole();
                plaintext.resize(plaintext.len() + holes::hole_plaintext_len(record.len()), 0);
                continue;
            }
            let block = self
                .codec
                .decrypt_block(&file_id, block_no, record)
                .map_err(|source| {
                    self.stats.record_integrity_failure();
                    warn!(path = %self.path.display(), block = block_no, "Corrupt block");
                    ContentError::Block {
                        source,
                        context: self.context("read").with_block(block_no),
                    }
                })?;
            self.stats.record_decrypted();
            plaintext.extend_from_slice(&block);
        }

        let skip = spans[0].skip;
        if plaintext.len() <= skip {
            return Ok(Vec::new());
        }
        let want = skip.saturating_add(usize::try_from(len).unwrap_or(usize::MAX));
        plaintext.truncate(want.min(plaintext.len()));
        plaintext.drain(..skip);
        Ok(plaintext)
    }

    fn write_locked(&self, offset: u64, data: &[u8]) -> Result<usize, ContentError> {
        if data.is_empty() {
            return Ok(0);
        }
        let (file_id, created) = self.ensure_header()?;

        let spans = explode_range(offset, data.len() as u64);
        let mut blocks = Vec::with_capacity(spans.len());
        let mut consumed = 0;
        for span in &spans {
            let chunk = &data[consumed..consumed + span.len];
            consumed += span.len;
            if span.is_partial() {
                self.stats.record_rmw();
                let mut block = self.read_locked(span.block_plaintext_offset(), BLOCK_SIZE as u64)?;
                merge_block(&mut block, chunk, span.skip);
                blocks.push(block);
            } else {
                blocks.push(chunk.to_vec());
            }
        }

        let first = spans[0];
        let parallel = blocks.len() >= self.parallel_threshold;
        let ciphertext = self
            .codec
            .encrypt_blocks(&file_id, first.block_no, &blocks, parallel)
            .map_err(|source| ContentError::Block {
                source,
                context: self.context("write"),
            })?;

        let cipher_offset = first.block_encrypted_offset();
        let stored = self
            .reserve_for_write(cipher_offset, ciphertext.len() as u64)
            .and_then(|()| {
                self.store
                    .write_all_at(&ciphertext, cipher_offset)
                    .map_err(|e| self.io_error(e, "write").with_block_no(first.block_no))
            });
        if let Err(e) = stored {
            if created {
                // Leave no header behind for a file that received no content.
                if let Err(rollback) = self.discard_header() {
                    warn!(error = %rollback, "Failed to roll back file header");
                }
            }
            return Err(e);
        }

        self.stats.record_encrypted(blocks.len() as u64);
        trace!(
            first_block = first.block_no,
            blocks = blocks.len(),
            parallel,
            "Stored blocks"
        );
        Ok(data.len())
    }

    /// Reserve storage ahead of a write so ENOSPC surfaces before any block
    /// is overwritten.
    fn reserve_for_write(&self, offset: u64, len: u64) -> Result<(), ContentError> {
        if !self.preallocate || self.reservation_unsupported.load(Ordering::Relaxed) {
            return Ok(());
        }
        match self.store.reserve(offset, len) {
            Ok(()) => Ok(()),
            Err(e) if store::is_reservation_unsupported(&e) => {
                if !self.reservation_unsupported.swap(true, Ordering::Relaxed) {
                    warn!(
                        path = %self.path.display(),
                        "Backing filesystem cannot reserve storage, writing without preallocation"
                    );
                }
                Ok(())
            }
            Err(e) => Err(self.io_error(e, "preallocate")),
        }
    }

    fn truncate_locked(&self, new_size: u64) -> Result<(), ContentError> {
        if new_size == 0 {
            self.discard_header()?;
            debug!("Truncated to zero, header discarded");
            return Ok(());
        }

        let old_size = self.plaintext_size_locked()?;
        if new_size == old_size {
            return Ok(());
        }
        if new_size > old_size {
            return self.grow_locked(old_size, new_size);
        }

        let plan = holes::plan_shrink(new_size);
        let Some(fill) = plan.keep else {
            self.store
                .set_len(plan.cut_at)
                .map_err(|e| self.io_error(e, "truncate"))?;
            debug!(old_size, new_size, "Shrunk file to a block boundary");
            return Ok(());
        };

        let data = self.read_locked(fill.offset, fill.len as u64)?;
        if data.len() != fill.len {
            return Err(ContentError::InvariantViolation {
                reason: format!(
                    "short read of {} bytes while keeping {} bytes of tail block",
                    data.len(),
                    fill.len
                ),
                context: self.context("truncate"),
            });
        }
        let file_id = self.load_header()?.ok_or_else(|| ContentError::InvariantViolation {
            reason: "non-empty container without header".to_string(),
            context: self.context("truncate"),
        })?;

        // The new tail record is stored over the start of the old one while
        // the container keeps its old length; only then is it cut. Any
        // failure before the cut leaves the old size and content.
        let block_no = plaintext_to_block_number(fill.offset);
        let record = self
            .codec
            .encrypt_block(&file_id, block_no, &data)
            .map_err(|source| ContentError::Block {
                source,
                context: self.context("truncate").with_block(block_no),
            })?;
        self.reserve_for_write(plan.cut_at, record.len() as u64)?;
        self.store
            .write_all_at(&record, plan.cut_at)
            .map_err(|e| self.io_error(e, "truncate").with_block_no(block_no))?;
        self.stats.record_encrypted(1);
        self.store
            .set_len(plan.cut_at + record.len() as u64)
            .map_err(|e| self.io_error(e, "truncate"))?;
        debug!(old_size, new_size, "Shrunk file");
        Ok(())
    }

    fn grow_locked(&self, old_size: u64, new_size: u64) -> Result<(), ContentError> {
        match holes::plan_grow(old_size, new_size) {
            GrowPlan::WithinTail { eof_offset } => {
                self.write_locked(eof_offset, &[0])?;
            }
            GrowPlan::Extend { padding, tail } => {
                if let Some(fill) = padding {
                    self.write_locked(fill.offset, &vec![0u8; fill.len])?;
                }
                match tail {
                    GrowTail::Aligned { encrypted_size } => {
                        self.ensure_header()?;
                        self.store
                            .set_len(encrypted_size)
                            .map_err(|e| self.io_error(e, "grow"))?;
                    }
                    GrowTail::Unaligned { eof_offset } => {
                        self.write_locked(eof_offset, &[0])?;
                    }
                }
            }
        }
        debug!(old_size, new_size, "Grew file");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Error helpers
    // ------------------------------------------------------------------------

    /// Reject ranges ending past [`MAX_PLAINTEXT_SIZE`] and return the end.
    fn check_range(
        &self,
        offset: u64,
        len: u64,
        operation: &'static str,
    ) -> Result<u64, ContentError> {
        match offset.checked_add(len) {
            Some(end) if end <= MAX_PLAINTEXT_SIZE => Ok(end),
            _ => Err(ContentError::InvariantViolation {
                reason: format!(
                    "range offset={offset} len={len} exceeds the maximum file size {MAX_PLAINTEXT_SIZE}"
                ),
                context: self.context(operation),
            }),
        }
    }

    fn context(&self, operation: &'static str) -> ContentContext {
        ContentContext::new()
            .with_path(&self.path)
            .with_operation(operation)
    }

    fn io_error(&self, source: io::Error, operation: &'static str) -> ContentError {
        ContentError::Io {
            source,
            context: self.context(operation),
        }
    }

    fn corrupt_size(&self, size: u64) -> ContentError {
        warn!(path = %self.path.display(), size, "Container size is not a valid encrypted size");
        ContentError::CorruptSize {
            size,
            context: self.context("stat"),
        }
    }
}

impl ContentError {
    fn with_block_no(mut self, block_no: u64) -> Self {
        if let ContentError::Io { context, .. } = &mut self {
            context.block_no = Some(block_no);
        }
        self
    }
}
