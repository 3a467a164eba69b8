//! Thread-safe handle table for open content files.
//!
//! Handles are auto-incrementing `u64` IDs starting at 1; 0 is reserved as
//! the invalid handle, matching what FUSE front ends expect.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};

/// Concurrent map from handle IDs to handle values.
///
/// # Example
///
/// ```
/// use oxcrypt_content::engine::HandleTable;
///
/// let table: HandleTable<String> = HandleTable::new();
///
/// let id1 = table.insert("file1".to_string());
/// let id2 = table.insert("file2".to_string());
///
/// assert_ne!(id1, id2);
/// assert_eq!(table.len(), 2);
/// assert_eq!(table.remove(id1), Some("file1".to_string()));
/// ```
#[derive(Debug)]
pub struct HandleTable<V> {
    handles: DashMap<u64, V>,
    next_id: AtomicU64,
}

impl<V> HandleTable<V> {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Insert a value under a fresh ID and return the ID.
    pub fn insert(&self, value: V) -> u64 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            // Wrapped around
            if id == 0 {
                continue;
            }
            if let Entry::Vacant(entry) = self.handles.entry(id) {
                entry.insert(value);
                return id;
            }
        }
    }

    /// Remove a handle and return its value.
    pub fn remove(&self, id: u64) -> Option<V> {
        self.handles.remove(&id).map(|(_, v)| v)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<V: Clone> HandleTable<V> {
    /// Clone out the value for `id`, releasing the shard lock immediately.
    pub fn get(&self, id: u64) -> Option<V> {
        self.handles.get(&id).map(|v| v.value().clone())
    }
}

impl<V> Default for HandleTable<V> {
    fn default() -> Self {
        Self::new()
    }
}
