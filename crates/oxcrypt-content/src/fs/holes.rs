//! Hole tracking for sparse containers.
//!
//! Unwritten blocks are never materialized as encrypted zeros. They are left
//! as gaps in the backing file (which the backing filesystem stores sparsely)
//! or as storage reserved by `fallocate`; either way the record reads back as
//! all zero bytes. An all-zero record is therefore a hole and decodes to zero
//! plaintext without touching the cipher.
//!
//! The planning functions here decide which blocks must be written when a
//! file grows or shrinks so that every block except the last stays full.

use super::layout::{
    BLOCK_OVERHEAD, BLOCK_SIZE, CIPHER_BLOCK_SIZE, block_to_encrypted_offset,
    block_to_plaintext_offset, plaintext_to_block_number, plaintext_to_block_offset,
    plaintext_to_encrypted_size,
};

/// Physical state of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    /// No ciphertext: a sparse gap, reserved storage, or beyond the container end.
    Absent,
    /// A record holding a full block of plaintext.
    Full,
    /// A record holding less than a full block (only valid for the last block).
    PartialTail,
}

/// True if `record` is a hole: non-empty and entirely zero bytes.
#[inline]
pub fn is_hole(record: &[u8]) -> bool {
    !record.is_empty() && record.iter().all(|&b| b == 0)
}

/// Number of plaintext zero bytes a hole record of `record_len` bytes stands for.
#[inline]
pub fn hole_plaintext_len(record_len: usize) -> usize {
    record_len.saturating_sub(BLOCK_OVERHEAD)
}

/// Classify the record read for one block.
pub fn classify_record(record: &[u8]) -> BlockState {
    if record.is_empty() || is_hole(record) {
        BlockState::Absent
    } else if record.len() >= CIPHER_BLOCK_SIZE {
        BlockState::Full
    } else {
        BlockState::PartialTail
    }
}

/// A run of zero bytes that must be written through the normal write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroFill {
    pub offset: u64,
    pub len: usize,
}

/// Zero padding that brings a partial last block up to the block boundary.
///
/// Returns `None` when `plaintext_size` is already block-aligned.
pub fn tail_padding(plaintext_size: u64) -> Option<ZeroFill> {
    let tail = plaintext_to_block_offset(plaintext_size);
    if tail == 0 {
        return None;
    }
    Some(ZeroFill {
        offset: plaintext_size,
        len: BLOCK_SIZE - tail,
    })
}

/// Padding required before writing at `target_offset`.
///
/// A write starting in the block that holds the current EOF needs nothing.
/// A write starting in any later block would leave the old last block
/// partial in the middle of the file, so it is padded to full size first.
pub fn padding_before_write(plaintext_size: u64, target_offset: u64) -> Option<ZeroFill> {
    let next_block = plaintext_to_block_number(plaintext_size);
    let target_block = plaintext_to_block_number(target_offset);
    if target_block <= next_block {
        return None;
    }
    tail_padding(plaintext_size)
}

/// How the last block is produced when a file grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowTail {
    /// The new size is block-aligned: extending the container to
    /// `encrypted_size` leaves every new block as a hole.
    Aligned { encrypted_size: u64 },
    /// The new size ends inside a block: a single zero byte written at
    /// `eof_offset` creates the new partial tail.
    Unaligned { eof_offset: u64 },
}

/// Steps for growing a file from `old_size` to a larger `new_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowPlan {
    /// The new end lies in the current last block; rewriting that block with
    /// a zero byte at `eof_offset` is enough.
    WithinTail { eof_offset: u64 },
    /// At least one new block appears.
    Extend {
        padding: Option<ZeroFill>,
        tail: GrowTail,
    },
}

/// Plan a grow. Requires `new_size > old_size`.
pub fn plan_grow(old_size: u64, new_size: u64) -> GrowPlan {
    debug_assert!(new_size > old_size);
    let eof_offset = new_size - 1;
    if old_size > 0
        && plaintext_to_block_number(old_size - 1) == plaintext_to_block_number(eof_offset)
    {
        return GrowPlan::WithinTail { eof_offset };
    }

    let tail = if plaintext_to_block_offset(new_size) == 0 {
        GrowTail::Aligned {
            encrypted_size: plaintext_to_encrypted_size(new_size),
        }
    } else {
        GrowTail::Unaligned { eof_offset }
    };
    GrowPlan::Extend {
        padding: tail_padding(old_size),
        tail,
    }
}

/// Steps for shrinking a file to a smaller, non-zero `new_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShrinkPlan {
    /// Container length after cutting away the straddling block and
    /// everything behind it.
    pub cut_at: u64,
    /// Plaintext of the straddling block that survives and must be rewritten
    /// as the new partial tail.
    pub keep: Option<ZeroFill>,
}

/// Plan a shrink to `new_size`.
pub fn plan_shrink(new_size: u64) -> ShrinkPlan {
    let block_no = plaintext_to_block_number(new_size);
    let keep_len = plaintext_to_block_offset(new_size);
    ShrinkPlan {
        cut_at: block_to_encrypted_offset(block_no),
        keep: (keep_len > 0).then(|| ZeroFill {
            offset: block_to_plaintext_offset(block_no),
            len: keep_len,
        }),
    }
}

/// Container range `(offset, length)` to reserve for the plaintext range
/// `[offset, offset + len)`.
///
/// The range ends exactly where the last touched byte's record data would
/// end, so reserving it never changes how the final partial block decodes.
pub fn reservation_range(offset: u64, len: u64) -> Option<(u64, u64)> {
    let last_byte = (offset + len).checked_sub(1).filter(|_| len > 0)?;
    let start = block_to_encrypted_offset(plaintext_to_block_number(offset));
    let end = block_to_encrypted_offset(plaintext_to_block_number(last_byte))
        + BLOCK_OVERHEAD as u64
        + plaintext_to_block_offset(last_byte) as u64
        + 1;
    Some((start, end - start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::layout::HEADER_SIZE;

    #[test]
    fn test_hole_detection() {
        assert!(is_hole(&[0u8; CIPHER_BLOCK_SIZE]));
        assert!(is_hole(&[0u8; 40]));
        assert!(!is_hole(&[]));
        let mut record = vec![0u8; 100];
        record[99] = 1;
        assert!(!is_hole(&record));
        assert_eq!(hole_plaintext_len(CIPHER_BLOCK_SIZE), BLOCK_SIZE);
        assert_eq!(hole_plaintext_len(10), 0);
    }

    #[test]
    fn test_classify_record() {
        assert_eq!(classify_record(&[]), BlockState::Absent);
        assert_eq!(classify_record(&[0u8; CIPHER_BLOCK_SIZE]), BlockState::Absent);
        assert_eq!(classify_record(&[1u8; CIPHER_BLOCK_SIZE]), BlockState::Full);
        assert_eq!(classify_record(&[1u8; 31]), BlockState::PartialTail);
    }

    #[test]
    fn test_tail_padding() {
        assert_eq!(tail_padding(0), None);
        assert_eq!(tail_padding(4096), None);
        assert_eq!(tail_padding(3), Some(ZeroFill { offset: 3, len: 4093 }));
        assert_eq!(tail_padding(4097), Some(ZeroFill { offset: 4097, len: 4095 }));
    }

    #[test]
    fn test_padding_before_write() {
        // Writing into the block holding EOF needs no padding.
        assert_eq!(padding_before_write(3, 100), None);
        assert_eq!(padding_before_write(4096, 8191), None);
        // Any later block pads the old tail.
        assert_eq!(
            padding_before_write(3, 4096),
            Some(ZeroFill { offset: 3, len: 4093 })
        );
        assert_eq!(
            padding_before_write(3, 8192),
            Some(ZeroFill { offset: 3, len: 4093 })
        );
        assert_eq!(padding_before_write(0, 40960), None);
    }

    #[test]
    fn test_plan_grow_within_tail() {
        assert_eq!(plan_grow(465, 4096), GrowPlan::WithinTail { eof_offset: 4095 });
        assert_eq!(plan_grow(6999, 7000), GrowPlan::WithinTail { eof_offset: 6999 });
    }

    #[test]
    fn test_plan_grow_aligned_from_empty() {
        assert_eq!(
            plan_grow(0, 10 * 1024 * 1024),
            GrowPlan::Extend {
                padding: None,
                tail: GrowTail::Aligned {
                    encrypted_size: HEADER_SIZE as u64 + 2560 * CIPHER_BLOCK_SIZE as u64,
                },
            }
        );
    }

    #[test]
    fn test_plan_grow_unaligned_with_padding() {
        assert_eq!(
            plan_grow(100, 7000),
            GrowPlan::Extend {
                padding: Some(ZeroFill { offset: 100, len: 3996 }),
                tail: GrowTail::Unaligned { eof_offset: 6999 },
            }
        );
    }

    #[test]
    fn test_plan_shrink() {
        assert_eq!(
            plan_shrink(465),
            ShrinkPlan {
                cut_at: HEADER_SIZE as u64,
                keep: Some(ZeroFill { offset: 0, len: 465 }),
            }
        );
        assert_eq!(
            plan_shrink(8192),
            ShrinkPlan {
                cut_at: HEADER_SIZE as u64 + 2 * CIPHER_BLOCK_SIZE as u64,
                keep: None,
            }
        );
    }

    #[test]
    fn test_reservation_range() {
        assert_eq!(reservation_range(0, 0), None);
        assert_eq!(reservation_range(0, 10), Some((18, 28 + 10)));
        assert_eq!(
            reservation_range(4000, 200),
            Some((18, CIPHER_BLOCK_SIZE as u64 + 28 + 104))
        );
        // Block-aligned end covers the whole last record
        assert_eq!(
            reservation_range(4096, 4096),
            Some((18 + CIPHER_BLOCK_SIZE as u64, CIPHER_BLOCK_SIZE as u64))
        );
    }
}
