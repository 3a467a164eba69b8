//! Async facade over [`ContentEngine`].
//!
//! Every operation runs on Tokio's blocking pool via `spawn_blocking`; block
//! encryption and positional file I/O stay synchronous underneath. Semantics
//! are exactly those of the synchronous engine.

use std::path::PathBuf;
use std::sync::Arc;

use super::{ContentEngine, EngineError};
use crate::fs::{BlockState, ContentStat, ContentStatsSnapshot};

/// Async wrapper around a shared [`ContentEngine`].
///
/// Cheap to clone; clones share the engine, its handles and its open files.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use std::sync::Arc;
/// use oxcrypt_content::{ContentEngine, ContentEngineAsync, ContentKey, EngineConfig};
///
/// let dir = tempfile::tempdir().unwrap();
/// let engine = ContentEngine::new(&ContentKey::random().unwrap(), EngineConfig::default()).unwrap();
/// let engine = ContentEngineAsync::new(Arc::new(engine));
///
/// let fh = engine.create(dir.path().join("a.c")).await.unwrap();
/// engine.write(fh, 0, b"async".to_vec()).await.unwrap();
/// assert_eq!(engine.read(fh, 0, 16).await.unwrap(), b"async");
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ContentEngineAsync {
    inner: Arc<ContentEngine>,
}

impl ContentEngineAsync {
    pub fn new(inner: Arc<ContentEngine>) -> Self {
        Self { inner }
    }

    /// The wrapped synchronous engine.
    pub fn engine(&self) -> &Arc<ContentEngine> {
        &self.inner
    }

    async fn run<T, F>(&self, op: F) -> Result<T, EngineError>
    where
        T: Send + 'static,
        F: FnOnce(&ContentEngine) -> Result<T, EngineError> + Send + 'static,
    {
        let engine = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&engine))
            .await
            .map_err(|e| EngineError::TaskJoin(e.to_string()))?
    }

    pub async fn create(&self, path: impl Into<PathBuf>) -> Result<u64, EngineError> {
        let path = path.into();
        self.run(move |e| e.create(&path)).await
    }

    pub async fn open(&self, path: impl Into<PathBuf>) -> Result<u64, EngineError> {
        let path = path.into();
        self.run(move |e| e.open(&path)).await
    }

    pub async fn read(&self, fh: u64, offset: u64, len: usize) -> Result<Vec<u8>, EngineError> {
        self.run(move |e| e.read(fh, offset, len)).await
    }

    /// Takes the buffer by value so it can move to the blocking pool.
    pub async fn write(&self, fh: u64, offset: u64, data: Vec<u8>) -> Result<usize, EngineError> {
        self.run(move |e| e.write(fh, offset, &data)).await
    }

    pub async fn truncate(&self, fh: u64, size: u64) -> Result<(), EngineError> {
        self.run(move |e| e.truncate(fh, size)).await
    }

    pub async fn fallocate(
        &self,
        fh: u64,
        offset: u64,
        len: u64,
        flags: i32,
    ) -> Result<(), EngineError> {
        self.run(move |e| e.fallocate(fh, offset, len, flags)).await
    }

    pub async fn stat(&self, fh: u64) -> Result<ContentStat, EngineError> {
        self.run(move |e| e.stat(fh)).await
    }

    pub async fn block_states(
        &self,
        fh: u64,
        offset: u64,
        len: u64,
    ) -> Result<Vec<(u64, BlockState)>, EngineError> {
        self.run(move |e| e.block_states(fh, offset, len)).await
    }

    pub async fn fsync(&self, fh: u64) -> Result<(), EngineError> {
        self.run(move |e| e.fsync(fh)).await
    }

    pub async fn release(&self, fh: u64) -> Result<(), EngineError> {
        self.run(move |e| e.release(fh)).await
    }

    pub async fn unlink(&self, path: impl Into<PathBuf>) -> Result<(), EngineError> {
        let path = path.into();
        self.run(move |e| e.unlink(&path)).await
    }

    pub fn stats(&self) -> ContentStatsSnapshot {
        self.inner.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::crypto::ContentKey;
    use tempfile::TempDir;

    fn engine() -> ContentEngineAsync {
        let key = ContentKey::new([0x33; 32]).unwrap();
        ContentEngineAsync::new(Arc::new(
            ContentEngine::new(&key, EngineConfig::default()).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_async_roundtrip() {
        let dir = TempDir::new().unwrap();
        let engine = engine();
        let fh = engine.create(dir.path().join("f.c")).await.unwrap();

        engine.write(fh, 4096, b"foo".to_vec()).await.unwrap();
        assert_eq!(engine.stat(fh).await.unwrap().plaintext_size, 4099);
        let data = engine.read(fh, 0, 8192).await.unwrap();
        assert_eq!(data.len(), 4099);
        assert!(data[..4096].iter().all(|&b| b == 0));
        assert_eq!(&data[4096..], b"foo");

        engine.truncate(fh, 3).await.unwrap();
        assert_eq!(engine.read(fh, 0, 100).await.unwrap(), vec![0u8; 3]);
        engine.release(fh).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_tasks_on_distinct_files() {
        let dir = TempDir::new().unwrap();
        let engine = engine();

        let tasks: Vec<_> = (0u8..8)
            .map(|i| {
                let engine = engine.clone();
                let path = dir.path().join(format!("f{i}.c"));
                tokio::spawn(async move {
                    let fh = engine.create(path).await.unwrap();
                    engine.write(fh, 0, vec![i; 10_000]).await.unwrap();
                    let back = engine.read(fh, 0, 10_000).await.unwrap();
                    engine.release(fh).await.unwrap();
                    back == vec![i; 10_000]
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(engine.engine().open_files(), 0);
    }

    #[tokio::test]
    async fn test_async_errors_map_to_errno() {
        let engine = engine();
        let err = engine.read(5, 0, 1).await.unwrap_err();
        assert_eq!(err.to_errno(), libc::EBADF);
    }
}
