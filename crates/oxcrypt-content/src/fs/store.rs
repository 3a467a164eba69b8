//! Positional I/O on the backing container file.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, MetadataExt};
use std::path::Path;

/// Identity of a backing file, stable across renames and hard links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileKey {
    pub dev: u64,
    pub ino: u64,
}

/// A container file on the backing store.
///
/// All access is positional (`pread`/`pwrite`), so one instance can be shared
/// between threads without a seek cursor.
#[derive(Debug)]
pub struct CipherFile {
    file: File,
    #[cfg(test)]
    write_budget: std::sync::atomic::AtomicUsize,
}

impl CipherFile {
    /// Open an existing container for reading and writing.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::wrap(file))
    }

    /// Create a new, empty container. Fails if `path` exists.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        Ok(Self::wrap(file))
    }

    fn wrap(file: File) -> Self {
        Self {
            file,
            #[cfg(test)]
            write_budget: std::sync::atomic::AtomicUsize::new(usize::MAX),
        }
    }

    /// Current container length in bytes.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Bytes of storage the backing filesystem has allocated to the container.
    pub fn allocated_bytes(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.blocks() * 512)
    }

    pub fn identity(&self) -> io::Result<FileKey> {
        let meta = self.file.metadata()?;
        Ok(FileKey {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    /// Read up to `buf.len()` bytes at `offset`, stopping early only at EOF.
    ///
    /// Returns the number of bytes read.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    pub fn write_all_at(&self, buf: &[u8], offset: u64) -> io::Result<()> {
        #[cfg(test)]
        self.consume_write_budget()?;
        self.file.write_all_at(buf, offset)
    }

    /// Truncate or extend the container. Extension leaves a sparse gap.
    pub fn set_len(&self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    pub fn sync_data(&self) -> io::Result<()> {
        self.file.sync_data()
    }

    /// Reserve storage for `[offset, offset + len)` without changing the
    /// container length (`FALLOC_FL_KEEP_SIZE`).
    ///
    /// Reserved but unwritten ranges read back as zero bytes.
    #[cfg(target_os = "linux")]
    pub fn reserve(&self, offset: u64, len: u64) -> io::Result<()> {
        use std::os::unix::io::AsRawFd;

        let invalid = || io::Error::from(io::ErrorKind::InvalidInput);
        let offset = libc::off_t::try_from(offset).map_err(|_| invalid())?;
        let len = libc::off_t::try_from(len).map_err(|_| invalid())?;
        loop {
            // SAFETY: the descriptor is owned by `self.file` and stays open for
            // the duration of the call; fallocate reads no user memory.
            let ret = unsafe {
                libc::fallocate(
                    self.file.as_raw_fd(),
                    libc::FALLOC_FL_KEEP_SIZE,
                    offset,
                    len,
                )
            };
            if ret == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn reserve(&self, _offset: u64, _len: u64) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::Unsupported))
    }
}

#[cfg(test)]
impl CipherFile {
    /// Let the next `n` writes through; every write after that fails with
    /// ENOSPC without touching the file.
    pub(crate) fn fail_writes_after(&self, n: usize) {
        use std::sync::atomic::Ordering;
        self.write_budget.store(n, Ordering::SeqCst);
    }

    fn consume_write_budget(&self) -> io::Result<()> {
        use std::sync::atomic::Ordering;
        self.write_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map(|_| ())
            .map_err(|_| io::Error::from_raw_os_error(libc::ENOSPC))
    }
}

/// True if `err` means the backing filesystem cannot reserve storage.
pub fn is_reservation_unsupported(err: &io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EOPNOTSUPP | libc::ENOSYS))
        || err.kind() == io::ErrorKind::Unsupported
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_positional_io() {
        let dir = TempDir::new().unwrap();
        let file = CipherFile::create(&dir.path().join("c")).unwrap();
        file.write_all_at(b"world", 6).unwrap();
        file.write_all_at(b"hello ", 0).unwrap();
        assert_eq!(file.len().unwrap(), 11);

        let mut buf = [0u8; 32];
        let n = file.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"hello world");
        assert_eq!(file.read_at(&mut buf, 100).unwrap(), 0);
    }

    #[test]
    fn test_write_budget_fails_with_enospc() {
        let dir = TempDir::new().unwrap();
        let file = CipherFile::create(&dir.path().join("c")).unwrap();
        file.fail_writes_after(1);
        file.write_all_at(b"ok", 0).unwrap();
        let err = file.write_all_at(b"no", 2).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOSPC));
        assert_eq!(file.len().unwrap(), 2);
    }

    #[test]
    fn test_create_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c");
        CipherFile::create(&path).unwrap();
        let err = CipherFile::create(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        CipherFile::open(&path).unwrap();
    }

    #[test]
    fn test_set_len_leaves_zero_gap() {
        let dir = TempDir::new().unwrap();
        let file = CipherFile::create(&dir.path().join("c")).unwrap();
        file.write_all_at(b"x", 0).unwrap();
        file.set_len(8192).unwrap();
        let mut buf = vec![0xFFu8; 8191];
        assert_eq!(file.read_at(&mut buf, 1).unwrap(), 8191);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_identity_shared_between_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c");
        let a = CipherFile::create(&path).unwrap();
        let b = CipherFile::open(&path).unwrap();
        assert_eq!(a.identity().unwrap(), b.identity().unwrap());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_reserve_keeps_size() {
        let dir = TempDir::new().unwrap();
        let file = CipherFile::create(&dir.path().join("c")).unwrap();
        match file.reserve(0, 1 << 20) {
            Ok(()) => assert_eq!(file.len().unwrap(), 0),
            Err(e) => assert!(is_reservation_unsupported(&e), "unexpected error {e}"),
        }
    }

    #[test]
    fn test_unsupported_classification() {
        assert!(is_reservation_unsupported(&io::Error::from_raw_os_error(libc::EOPNOTSUPP)));
        assert!(is_reservation_unsupported(&io::Error::from(io::ErrorKind::Unsupported)));
        assert!(!is_reservation_unsupported(&io::Error::from_raw_os_error(libc::ENOSPC)));
    }
}
