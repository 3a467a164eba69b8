//! Container layout and plaintext/ciphertext offset math.
//!
//! An encrypted container consists of:
//! - **Header (18 bytes)**: 2-byte big-endian format version + 16-byte file ID
//! - **Blocks (up to 4,124 bytes each)**: 12-byte nonce + ≤4KB ciphertext + 16-byte tag
//!
//! An empty plaintext file is an empty container; the header only exists once
//! the file holds at least one byte.

// ============================================================================
// Constants
// ============================================================================

/// Size of the file header in bytes (version + file ID).
pub const HEADER_SIZE: usize = 18;

/// Size of the per-block nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Maximum plaintext size per block (4 KB).
pub const BLOCK_SIZE: usize = 4096;

/// Overhead per block (nonce + tag).
pub const BLOCK_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

/// Maximum encrypted block size (nonce + ciphertext + tag).
pub const CIPHER_BLOCK_SIZE: usize = BLOCK_SIZE + BLOCK_OVERHEAD;

/// Largest plaintext size whose container length still fits in `off_t`.
///
/// Every offset and size accepted by the content operations is bounded by
/// this, so none of the block math below can overflow.
#[allow(clippy::cast_sign_loss)]
pub const MAX_PLAINTEXT_SIZE: u64 =
    (i64::MAX as u64 - HEADER_SIZE as u64) / CIPHER_BLOCK_SIZE as u64 * BLOCK_SIZE as u64;

// ============================================================================
// Block Math Helpers
// ============================================================================

/// Calculate which block contains the given plaintext byte offset.
#[inline]
pub fn plaintext_to_block_number(offset: u64) -> u64 {
    offset / BLOCK_SIZE as u64
}

/// Calculate the byte offset within a block for a given plaintext offset.
#[inline]
pub fn plaintext_to_block_offset(offset: u64) -> usize {
    (offset % BLOCK_SIZE as u64) as usize
}

/// Calculate the plaintext offset of the first byte of a block.
#[inline]
pub fn block_to_plaintext_offset(block_no: u64) -> u64 {
    block_no * BLOCK_SIZE as u64
}

/// Calculate the container offset for the start of a block record.
#[inline]
pub fn block_to_encrypted_offset(block_no: u64) -> u64 {
    HEADER_SIZE as u64 + block_no * CIPHER_BLOCK_SIZE as u64
}

/// Calculate plaintext file size from container size.
///
/// Returns `None` if the container cannot have been produced by the engine:
/// a partial header, or a trailing block record too short to hold any
/// plaintext.
pub fn encrypted_to_plaintext_size(encrypted_size: u64) -> Option<u64> {
    if encrypted_size == 0 {
        return Some(0);
    }
    if encrypted_size < HEADER_SIZE as u64 {
        return None;
    }

    let content_size = encrypted_size - HEADER_SIZE as u64;
    let full_blocks = content_size / CIPHER_BLOCK_SIZE as u64;
    let remainder = content_size % CIPHER_BLOCK_SIZE as u64;

    let mut plaintext_size = full_blocks * BLOCK_SIZE as u64;
    if remainder > 0 {
        if remainder <= BLOCK_OVERHEAD as u64 {
            return None;
        }
        plaintext_size += remainder - BLOCK_OVERHEAD as u64;
    }

    Some(plaintext_size)
}

/// Calculate the container size holding `plaintext_size` bytes.
///
/// Inverse of [`encrypted_to_plaintext_size`]. A zero-length file has no
/// header and therefore a zero-length container.
pub fn plaintext_to_encrypted_size(plaintext_size: u64) -> u64 {
    if plaintext_size == 0 {
        return 0;
    }
    let blocks = plaintext_size.div_ceil(BLOCK_SIZE as u64);
    HEADER_SIZE as u64 + plaintext_size + blocks * BLOCK_OVERHEAD as u64
}

// ============================================================================
// Range Explosion
// ============================================================================

/// The part of a single block touched by a plaintext byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    /// Zero-based block number within the file.
    pub block_no: u64,
    /// Bytes to skip at the start of the block.
    pub skip: usize,
    /// Bytes of the block covered by the range.
    pub len: usize,
}

impl BlockSpan {
    /// True if the span does not cover the whole block, so a write to it
    /// needs a read-modify-write cycle.
    #[inline]
    pub fn is_partial(&self) -> bool {
        self.skip > 0 || self.len < BLOCK_SIZE
    }

    /// Plaintext offset of the first byte of the block.
    #[inline]
    pub fn block_plaintext_offset(&self) -> u64 {
        block_to_plaintext_offset(self.block_no)
    }

    /// Container offset of the block record.
    #[inline]
    pub fn block_encrypted_offset(&self) -> u64 {
        block_to_encrypted_offset(self.block_no)
    }

    /// End of the span within the block (exclusive).
    #[inline]
    pub fn end(&self) -> usize {
        self.skip + self.len
    }
}

/// Split the plaintext range `[offset, offset + len)` into per-block spans.
///
/// An empty range yields no spans.
pub fn explode_range(mut offset: u64, mut len: u64) -> Vec<BlockSpan> {
    let mut spans = Vec::with_capacity(len.div_ceil(BLOCK_SIZE as u64) as usize + 1);
    while len > 0 {
        let block_no = plaintext_to_block_number(offset);
        let skip = plaintext_to_block_offset(offset);
        let take = len.min((BLOCK_SIZE - skip) as u64);
        #[allow(clippy::cast_possible_truncation)]
        spans.push(BlockSpan {
            block_no,
            skip,
            len: take as usize,
        });
        offset += take;
        len -= take;
    }
    spans
}

/// Container range `(offset, length)` covering every block record of `spans`
/// in full.
///
/// Returns `None` for an empty slice.
pub fn joint_encrypted_range(spans: &[BlockSpan]) -> Option<(u64, u64)> {
    let first = spans.first()?;
    let last = spans.last()?;
    let count = last.block_no - first.block_no + 1;
    Some((
        first.block_encrypted_offset(),
        count * CIPHER_BLOCK_SIZE as u64,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_math() {
        assert_eq!(plaintext_to_block_number(0), 0);
        assert_eq!(plaintext_to_block_number(4095), 0);
        assert_eq!(plaintext_to_block_number(4096), 1);
        assert_eq!(plaintext_to_block_offset(4097), 1);
        assert_eq!(block_to_encrypted_offset(0), 18);
        assert_eq!(block_to_encrypted_offset(2), 18 + 2 * 4124);
        assert_eq!(block_to_plaintext_offset(3), 12288);
    }

    #[test]
    fn test_max_plaintext_size_fits_off_t() {
        assert_eq!(MAX_PLAINTEXT_SIZE % BLOCK_SIZE as u64, 0);
        let encrypted = plaintext_to_encrypted_size(MAX_PLAINTEXT_SIZE);
        assert!(encrypted <= i64::MAX as u64);
        assert_eq!(encrypted_to_plaintext_size(encrypted), Some(MAX_PLAINTEXT_SIZE));
    }

    #[test]
    fn test_encrypted_to_plaintext_size() {
        assert_eq!(encrypted_to_plaintext_size(0), Some(0));
        assert_eq!(encrypted_to_plaintext_size(18), Some(0));
        assert_eq!(encrypted_to_plaintext_size(17), None);
        assert_eq!(encrypted_to_plaintext_size(18 + 28), None);
        assert_eq!(encrypted_to_plaintext_size(18 + 29), Some(1));
        assert_eq!(encrypted_to_plaintext_size(18 + 4124), Some(4096));
        assert_eq!(encrypted_to_plaintext_size(18 + 4124 + 28 + 3), Some(4099));
        assert_eq!(encrypted_to_plaintext_size(18 + 4124 + 10), None);
    }

    #[test]
    fn test_size_conversion_inverse() {
        for size in [1u64, 3, 465, 4095, 4096, 4097, 6999, 7000, 10 * 1024 * 1024 + 100] {
            let encrypted = plaintext_to_encrypted_size(size);
            assert_eq!(encrypted_to_plaintext_size(encrypted), Some(size), "size {size}");
        }
        assert_eq!(plaintext_to_encrypted_size(0), 0);
        assert_eq!(plaintext_to_encrypted_size(4096), 18 + 4124);
    }

    #[test]
    fn test_explode_single_block() {
        let spans = explode_range(10, 20);
        assert_eq!(spans, vec![BlockSpan { block_no: 0, skip: 10, len: 20 }]);
        assert!(spans[0].is_partial());
        assert_eq!(spans[0].end(), 30);
    }

    #[test]
    fn test_explode_multiple_blocks() {
        let spans = explode_range(4000, 8192);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0], BlockSpan { block_no: 0, skip: 4000, len: 96 });
        assert_eq!(spans[1], BlockSpan { block_no: 1, skip: 0, len: 4096 });
        assert!(!spans[1].is_partial());
        assert_eq!(spans[2], BlockSpan { block_no: 2, skip: 0, len: 4000 });
    }

    #[test]
    fn test_explode_empty() {
        assert!(explode_range(12345, 0).is_empty());
        assert_eq!(joint_encrypted_range(&[]), None);
    }

    #[test]
    fn test_joint_encrypted_range() {
        let spans = explode_range(4000, 8192);
        assert_eq!(joint_encrypted_range(&spans), Some((18, 3 * 4124)));
    }
}
