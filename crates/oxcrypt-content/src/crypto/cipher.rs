//! AES-256-GCM primitive with interchangeable implementations.
//!
//! Both backends produce byte-identical output for the same key, nonce and
//! associated data, so a container written through one is readable through
//! the other.

use std::fmt;

use aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use ring::aead as ring_aead;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::keys::{ContentKey, KeyAccessError};
use crate::fs::layout::NONCE_SIZE;

/// Which AES-GCM implementation encrypts blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherBackend {
    /// The RustCrypto `aes-gcm` crate.
    #[default]
    RustCrypto,
    /// `ring`'s BoringSSL-derived implementation.
    Ring,
}

impl CipherBackend {
    /// Every available backend, for test matrices.
    pub const ALL: [CipherBackend; 2] = [CipherBackend::RustCrypto, CipherBackend::Ring];

    pub fn name(self) -> &'static str {
        match self {
            Self::RustCrypto => "rust_crypto",
            Self::Ring => "ring",
        }
    }
}

impl fmt::Display for CipherBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors raised by the AEAD primitive.
#[derive(Debug, Error)]
pub enum CipherError {
    /// Key access failed
    #[error("Key access failed: {0}")]
    KeyAccess(#[from] KeyAccessError),

    /// The backend refused the key material
    #[error("Backend {backend} rejected the content key")]
    KeyRejected { backend: CipherBackend },

    /// Encryption failed (input too large for the AEAD)
    #[error("AEAD seal failed")]
    Seal,

    /// **[INTEGRITY VIOLATION]** Tag verification failed
    #[error("AEAD open failed: authentication tag mismatch")]
    Open,
}

enum Inner {
    RustCrypto(Box<Aes256Gcm>),
    Ring(ring_aead::LessSafeKey),
}

/// Keyed AES-256-GCM instance.
///
/// The key schedule is computed once at construction; the content key itself
/// is only exposed while the schedule is being built.
///
/// # Memory
///
/// Only the raw [`ContentKey`] bytes are locked and protected. The expanded
/// round keys live in ordinary heap memory owned by this value for as long as
/// it exists, so they can be swapped out or appear in a core dump. The AES
/// key schedule is invertible: anyone who reads it recovers the content key.
/// Drop the cipher (and its engine) as soon as the key is no longer needed.
pub struct BlockCipher {
    backend: CipherBackend,
    inner: Inner,
}

impl fmt::Debug for BlockCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockCipher")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl BlockCipher {
    pub fn new(key: &ContentKey, backend: CipherBackend) -> Result<Self, CipherError> {
        let inner = match backend {
            CipherBackend::RustCrypto => {
                let cipher = key.with_key(|k| Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(k)))?;
                Inner::RustCrypto(Box::new(cipher))
            }
            CipherBackend::Ring => {
                let unbound = key
                    .with_key(|k| ring_aead::UnboundKey::new(&ring_aead::AES_256_GCM, k))?
                    .map_err(|_| CipherError::KeyRejected { backend })?;
                Inner::Ring(ring_aead::LessSafeKey::new(unbound))
            }
        };
        Ok(Self { backend, inner })
    }

    pub fn backend(&self) -> CipherBackend {
        self.backend
    }

    /// Encrypt `plaintext`, returning `ciphertext || tag`.
    pub fn seal(
        &self,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        match &self.inner {
            Inner::RustCrypto(cipher) => cipher
                .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
                .map_err(|_| CipherError::Seal),
            Inner::Ring(key) => {
                let mut in_out = plaintext.to_vec();
                key.seal_in_place_append_tag(
                    ring_aead::Nonce::assume_unique_for_key(*nonce),
                    ring_aead::Aad::from(aad),
                    &mut in_out,
                )
                .map_err(|_| CipherError::Seal)?;
                Ok(in_out)
            }
        }
    }

    /// Verify and decrypt `ciphertext || tag`.
    pub fn open(
        &self,
        nonce: &[u8; NONCE_SIZE],
        aad: &[u8],
        sealed: &[u8],
    ) -> Result<Vec<u8>, CipherError> {
        match &self.inner {
            Inner::RustCrypto(cipher) => cipher
                .decrypt(Nonce::from_slice(nonce), Payload { msg: sealed, aad })
                .map_err(|_| CipherError::Open),
            Inner::Ring(key) => {
                let mut in_out = sealed.to_vec();
                let plain_len = key
                    .open_in_place(
                        ring_aead::Nonce::assume_unique_for_key(*nonce),
                        ring_aead::Aad::from(aad),
                        &mut in_out,
                    )
                    .map_err(|_| CipherError::Open)?
                    .len();
                in_out.truncate(plain_len);
                Ok(in_out)
            }
        }
    }
}
