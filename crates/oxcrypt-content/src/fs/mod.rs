//! Container format and content I/O.
//!
//! Leaf-first: [`layout`] holds the offset arithmetic, [`header`] and
//! [`block`] encode the two record types, [`holes`] plans sparse regions,
//! and [`content`] ties them together under a per-file [`lock`].

pub mod block;
pub mod content;
pub mod header;
pub mod holes;
pub mod layout;
pub mod lock;
pub mod stats;
pub mod store;

pub use block::{BlockCodec, BlockError};
pub use content::{
    ContentContext, ContentError, ContentErrorKind, ContentFile, ContentStat, FallocateMode,
    FALLOC_FL_KEEP_SIZE,
};
pub use header::{FileHeader, FileId, HeaderError};
pub use holes::BlockState;
pub use layout::{BLOCK_SIZE, CIPHER_BLOCK_SIZE, HEADER_SIZE};
pub use lock::ContentLock;
pub use stats::{ContentStats, ContentStatsSnapshot};
pub use store::{CipherFile, FileKey};
