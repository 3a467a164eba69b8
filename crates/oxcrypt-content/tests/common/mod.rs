#![allow(dead_code)] // Each test binary uses a different subset

use std::path::PathBuf;
use std::sync::Once;

use oxcrypt_content::{CipherBackend, ContentEngine, ContentKey, EngineConfig};
use tempfile::TempDir;

/// Create a deterministic content key for testing
pub fn test_key() -> ContentKey {
    ContentKey::new([0x01; 32]).unwrap()
}

/// A second, unrelated key
pub fn other_key() -> ContentKey {
    ContentKey::new([0x02; 32]).unwrap()
}

static TRACING: Once = Once::new();

/// Route engine logs to the test harness; filter with `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// An engine over a fresh temporary backing directory.
pub struct TestEngine {
    pub engine: ContentEngine,
    pub dir: TempDir,
}

impl TestEngine {
    pub fn new(backend: CipherBackend) -> Self {
        Self::with_config(EngineConfig::default().cipher(backend))
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();
        Self {
            engine: ContentEngine::new(&test_key(), config).unwrap(),
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Create `name` and return its handle.
    pub fn create(&self, name: &str) -> u64 {
        self.engine.create(&self.path(name)).unwrap()
    }

    /// Read the whole plaintext of an open file.
    pub fn read_all(&self, fh: u64) -> Vec<u8> {
        let size = self.engine.stat(fh).unwrap().plaintext_size;
        let data = self.engine.read(fh, 0, size as usize + 1).unwrap();
        assert_eq!(data.len() as u64, size, "read length differs from stat size");
        data
    }

    /// Hex MD5 of the whole plaintext.
    pub fn md5_hex(&self, fh: u64) -> String {
        format!("{:x}", md5::compute(self.read_all(fh)))
    }

    /// Raw container bytes as stored on the backing store.
    pub fn raw(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.path(name)).unwrap()
    }
}

/// Content of exactly `size` bytes with a repeating pattern
pub fn sized_content(size: usize) -> Vec<u8> {
    let pattern = b"0123456789ABCDEF";
    (0..size).map(|i| pattern[i % pattern.len()]).collect()
}

/// Run `f` once per cipher backend.
pub fn for_each_backend(mut f: impl FnMut(CipherBackend)) {
    for backend in CipherBackend::ALL {
        f(backend);
    }
}
