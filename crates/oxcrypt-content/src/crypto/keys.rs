use std::fmt;
use std::sync::RwLock;

use memsafe::MemSafe;
use rand::RngCore;
use thiserror::Error;

/// Error type for key access operations.
///
/// This error can occur when accessing protected key material, either due to
/// memory protection failures or lock poisoning (a thread panicked while holding the lock).
#[derive(Debug, Error)]
pub enum KeyAccessError {
    /// Memory protection operation failed (mlock, mprotect, etc.)
    #[error("Memory protection operation failed: {0}")]
    MemoryProtection(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Lock was poisoned (a thread panicked while holding it)
    #[error("Key lock was poisoned")]
    LockPoisoned,
}

impl KeyAccessError {
    /// Create a memory protection error from any error type.
    pub fn memory_protection<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        KeyAccessError::MemoryProtection(Box::new(err))
    }
}

/// 256-bit content key used to encrypt every block of every file.
///
/// Deriving this key from a passphrase is the caller's business; the engine
/// only ever receives raw key material.
///
/// # Security
///
/// The key is stored using the `memsafe` crate's `MemSafe` type, which provides:
/// - **Memory locking**: The key is pinned in RAM via `mlock`, preventing swap to disk
/// - **Access control**: Memory is protected with `mprotect(PROT_NONE)` when not in use
/// - **Zeroization**: Memory is securely zeroed when the key is dropped
///
/// Access goes through [`ContentKey::with_key`], which elevates memory
/// permissions only for the duration of the callback.
///
/// # Thread Safety
///
/// `ContentKey` is `Send + Sync` and can be shared across threads using
/// `Arc<ContentKey>`. If a thread panics while holding the lock, the key
/// becomes inaccessible (lock poisoning).
pub struct ContentKey {
    key: RwLock<MemSafe<[u8; 32]>>,
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl ContentKey {
    /// Generate a new random content key using a cryptographically secure RNG.
    ///
    /// # Errors
    ///
    /// Returns a `KeyAccessError` if memory protection initialization fails,
    /// for example when the process mlock limit is exhausted.
    pub fn random() -> Result<Self, KeyAccessError> {
        let mut key = zeroize::Zeroizing::new([0u8; 32]);
        rand::rng().fill_bytes(&mut key[..]);
        Self::new(*key)
    }

    /// Create a content key from raw key material.
    ///
    /// The caller is responsible for zeroing the original array if it
    /// contains sensitive data.
    ///
    /// # Example
    ///
    /// ```
    /// # use oxcrypt_content::crypto::ContentKey;
    /// let key = ContentKey::new([7u8; 32]).unwrap();
    /// assert_eq!(key.with_key(|k| k[0]).unwrap(), 7);
    /// ```
    pub fn new(key: [u8; 32]) -> Result<Self, KeyAccessError> {
        Ok(ContentKey {
            key: RwLock::new(MemSafe::new(key).map_err(KeyAccessError::memory_protection)?),
        })
    }

    /// Try to clone the key, returning an error on failure.
    pub fn try_clone(&self) -> Result<Self, KeyAccessError> {
        let raw = self.with_key(|k| zeroize::Zeroizing::new(*k))?;
        Self::new(*raw)
    }

    /// Execute a function with access to the raw 256-bit key.
    ///
    /// The key material never escapes this function and memory permissions
    /// are revoked as soon as the callback returns.
    ///
    /// # Errors
    ///
    /// Returns a `KeyAccessError` if the lock is poisoned or if
    /// memory protection operations fail.
    pub fn with_key<F, R>(&self, f: F) -> Result<R, KeyAccessError>
    where
        F: FnOnce(&[u8; 32]) -> R,
    {
        // MemSafe::read needs &mut to flip page protection.
        let mut lock = self
            .key
            .write()
            .map_err(|_| KeyAccessError::LockPoisoned)?;
        let guard = lock.read().map_err(KeyAccessError::memory_protection)?;
        Ok(f(&guard))
    }
}
