//! Block codec: one plaintext block to one authenticated block record.
//!
//! Record layout: `nonce (12) || ciphertext || tag (16)`.
//!
//! The associated data for block `n` of a file is `n` as a big-endian u64
//! followed by the 16-byte file ID, so records can be neither moved to a
//! different position nor spliced into a different file.
//!
//! Every encryption draws a fresh random nonce, including rewrites of an
//! existing block during read-modify-write.

use rand::RngCore;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{trace, warn};

use super::header::{FILE_ID_SIZE, FileId};
use super::layout::{BLOCK_OVERHEAD, BLOCK_SIZE, CIPHER_BLOCK_SIZE, NONCE_SIZE};
use crate::crypto::{BlockCipher, CipherBackend, CipherError, ContentKey};

/// Errors that can occur while encoding or decoding a single block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    /// **[INTEGRITY VIOLATION]** The authentication tag did not verify.
    ///
    /// Either the record was modified, or it belongs to a different block
    /// number or a different file.
    #[error("Block {block_no}: authentication tag mismatch")]
    Authentication { block_no: u64 },

    /// **[INTEGRITY VIOLATION]** The record cannot hold nonce, tag and at
    /// least one byte of ciphertext.
    #[error("Block {block_no}: record of {len} bytes is too short")]
    TooShort { block_no: u64, len: usize },

    /// **[INTEGRITY VIOLATION]** The record has an all-zero nonce but is not
    /// an all-zero hole.
    #[error("Block {block_no}: all-zero nonce")]
    ZeroNonce { block_no: u64 },

    /// The caller passed an empty or oversized block.
    #[error("Block {block_no}: invalid length {len}")]
    InvalidLength { block_no: u64, len: usize },

    /// The AEAD refused to encrypt.
    #[error("Block {block_no}: encryption failed")]
    Encryption { block_no: u64 },
}

impl BlockError {
    /// The block number the error refers to.
    pub fn block_no(&self) -> u64 {
        match self {
            Self::Authentication { block_no }
            | Self::TooShort { block_no, .. }
            | Self::ZeroNonce { block_no }
            | Self::InvalidLength { block_no, .. }
            | Self::Encryption { block_no } => *block_no,
        }
    }

    /// True if the error means stored data is damaged or forged.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::TooShort { .. } | Self::ZeroNonce { .. }
        )
    }
}

/// Associated data binding a block to its position and file.
fn block_aad(file_id: &FileId, block_no: u64) -> [u8; 8 + FILE_ID_SIZE] {
    let mut aad = [0u8; 8 + FILE_ID_SIZE];
    aad[..8].copy_from_slice(&block_no.to_be_bytes());
    aad[8..].copy_from_slice(file_id.as_bytes());
    aad
}

/// Stateless block encoder/decoder around a keyed AEAD.
#[derive(Debug)]
pub struct BlockCodec {
    cipher: BlockCipher,
}

impl BlockCodec {
    pub fn new(key: &ContentKey, backend: CipherBackend) -> Result<Self, CipherError> {
        Ok(Self {
            cipher: BlockCipher::new(key, backend)?,
        })
    }

    pub fn backend(&self) -> CipherBackend {
        self.cipher.backend()
    }

    /// Encrypt one block of `1..=BLOCK_SIZE` bytes.
    pub fn encrypt_block(
        &self,
        file_id: &FileId,
        block_no: u64,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, BlockError> {
        if plaintext.is_empty() || plaintext.len() > BLOCK_SIZE {
            return Err(BlockError::InvalidLength {
                block_no,
                len: plaintext.len(),
            });
        }

        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .seal(&nonce, &block_aad(file_id, block_no), plaintext)
            .map_err(|_| BlockError::Encryption { block_no })?;

        let mut record = Vec::with_capacity(NONCE_SIZE + sealed.len());
        record.extend_from_slice(&nonce);
        record.extend_from_slice(&sealed);
        trace!(block = block_no, len = plaintext.len(), "Encrypted block");
        Ok(record)
    }

    /// Verify and decrypt one block record.
    ///
    /// Hole records (all zero bytes) must be recognized by the caller before
    /// reaching this point; passed here they fail with [`BlockError::ZeroNonce`].
    pub fn decrypt_block(
        &self,
        file_id: &FileId,
        block_no: u64,
        record: &[u8],
    ) -> Result<Vec<u8>, BlockError> {
        if record.len() <= BLOCK_OVERHEAD {
            warn!(block = block_no, len = record.len(), "Block record too short");
            return Err(BlockError::TooShort {
                block_no,
                len: record.len(),
            });
        }
        if record.len() > CIPHER_BLOCK_SIZE {
            return Err(BlockError::InvalidLength {
                block_no,
                len: record.len(),
            });
        }

        let (nonce_bytes, sealed) = record.split_at(NONCE_SIZE);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(nonce_bytes);
        if nonce == [0u8; NONCE_SIZE] {
            warn!(block = block_no, "Block has all-zero nonce");
            return Err(BlockError::ZeroNonce { block_no });
        }

        self.cipher
            .open(&nonce, &block_aad(file_id, block_no), sealed)
            .map_err(|_| {
                warn!(block = block_no, "Block decryption failed - authentication tag mismatch");
                BlockError::Authentication { block_no }
            })
    }

    /// Encrypt consecutive blocks starting at `first_block_no` and return the
    /// concatenated records.
    ///
    /// With `parallel` set, blocks are encrypted on the rayon pool.
    pub fn encrypt_blocks(
        &self,
        file_id: &FileId,
        first_block_no: u64,
        blocks: &[Vec<u8>],
        parallel: bool,
    ) -> Result<Vec<u8>, BlockError> {
        let records: Vec<Vec<u8>> = if parallel {
            blocks
                .par_iter()
                .enumerate()
                .map(|(i, b)| self.encrypt_block(file_id, first_block_no + i as u64, b))
                .collect::<Result<_, _>>()?
        } else {
            blocks
                .iter()
                .enumerate()
                .map(|(i, b)| self.encrypt_block(file_id, first_block_no + i as u64, b))
                .collect::<Result<_, _>>()?
        };
        Ok(records.concat())
    }
}
