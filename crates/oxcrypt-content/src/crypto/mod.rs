//! Key material and the AEAD primitive used for block encryption.

pub mod cipher;
pub mod keys;
mod thread_safety;

pub use cipher::{BlockCipher, CipherBackend, CipherError};
pub use keys::{ContentKey, KeyAccessError};
