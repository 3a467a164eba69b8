//! Thread safety implementations for key material.
//!
//! `MemSafe` holds a raw pointer to its protected page, which suppresses the
//! automatic `Send` and `Sync` impls. `ContentKey` wraps its `MemSafe` in an
//! `RwLock`, and every access (including the `mprotect` calls made by
//! `MemSafe::read`) happens with the lock held exclusively.

use super::keys::ContentKey;

// SAFETY: ContentKey can be sent between threads because:
// - The only field is an RwLock that synchronizes all access
// - The MemSafe pointer refers to heap memory that is valid on any thread
// - mlock/mprotect are process-wide and thread-safe
unsafe impl Send for ContentKey {}

// SAFETY: ContentKey can be shared between threads because:
// - Key material is only reached through RwLock::write()
// - The raw pointer in MemSafe is never dereferenced without holding the lock
unsafe impl Sync for ContentKey {}
