//! # Extension Traits
//!
//! Convenience operations composed from the [`Store`] contract.
//!
//! Every helper opens what it needs, and closes it again on every path,
//! so it never leaves a handle or stream behind.
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`exists`](StoreExt::exists) | Existence check that maps not-found to `false` |
//! | [`is_file`](StoreExt::is_file) / [`is_dir`](StoreExt::is_dir) / [`is_symlink`](StoreExt::is_symlink) | Type checks |
//! | [`file_size`](StoreExt::file_size) | Size from `stat` |
//! | [`read_all`](StoreExt::read_all) / [`write_all`](StoreExt::write_all) | Whole-file I/O |
//! | [`read_dir`](StoreExt::read_dir) | Directory listing without `.` and `..` |
//! | [`read_link`](StoreExt::read_link) | Full symlink target, however long |
//!
//! With the `serde` feature, `StoreExtJson` adds `read_json` / `write_json`.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;

use crate::{
    AccessMode, DirEntry, ErrorKind, Handle, OpenFlags, Permissions, ReadDirIter, Store,
    StoreError,
};

const READ_CHUNK: usize = 64 * 1024;

/// Run `f` against `handle`, then close it. The first error wins.
fn with_handle<T>(
    handle: Box<dyn Handle>,
    f: impl FnOnce(&dyn Handle) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let result = f(handle.as_ref());
    let closed = handle.close();
    let value = result?;
    closed?;
    Ok(value)
}

/// Extension methods for any store.
///
/// # Example
///
/// ```rust
/// use iostore::{PosixStore, StoreExt};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = PosixStore::new();
/// let path = dir.path().join("notes.txt");
///
/// store.write_all(&path, b"remember").unwrap();
/// assert!(store.is_file(&path).unwrap());
/// assert_eq!(store.read_all(&path).unwrap(), b"remember");
/// ```
pub trait StoreExt: Store {
    /// `true` if `path` exists. Not-found is `Ok(false)`, other failures
    /// are errors.
    fn exists(&self, path: &Path) -> Result<bool, StoreError> {
        match self.access(path, AccessMode::EXISTS) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// `true` if `path` is a regular file (following symlinks).
    fn is_file(&self, path: &Path) -> Result<bool, StoreError> {
        match self.stat(path) {
            Ok(m) => Ok(m.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// `true` if `path` is a directory (following symlinks).
    fn is_dir(&self, path: &Path) -> Result<bool, StoreError> {
        match self.stat(path) {
            Ok(m) => Ok(m.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// `true` if `path` itself is a symlink.
    fn is_symlink(&self, path: &Path) -> Result<bool, StoreError> {
        match self.lstat(path) {
            Ok(m) => Ok(m.is_symlink()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Size of the file at `path` in bytes.
    fn file_size(&self, path: &Path) -> Result<u64, StoreError> {
        Ok(self.stat(path)?.size)
    }

    /// Read the whole file.
    fn read_all(&self, path: &Path) -> Result<Vec<u8>, StoreError> {
        let handle = self.open(path, OpenFlags::READ, Permissions::default_file())?;
        with_handle(handle, |h| {
            let mut data = Vec::new();
            let mut chunk = vec![0u8; READ_CHUNK];
            loop {
                let n = h.read(&mut chunk)?;
                if n == 0 {
                    return Ok(data);
                }
                data.extend_from_slice(&chunk[..n]);
            }
        })
    }

    /// Create or replace the file at `path` with `data`.
    fn write_all(&self, path: &Path, data: &[u8]) -> Result<(), StoreError> {
        let handle = self.open(path, OpenFlags::WRITE, Permissions::default_file())?;
        with_handle(handle, |h| {
            let mut written = 0;
            while written < data.len() {
                match h.write(&data[written..])? {
                    0 => return Err(StoreError::new("write", path, Errno::EIO)),
                    n => written += n,
                }
            }
            Ok(())
        })
    }

    /// List a directory, skipping `.` and `..`.
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>, StoreError> {
        ReadDirIter::new(self.opendir(path)?)
            .filter(|entry| !matches!(entry, Ok(e) if e.is_dot()))
            .collect()
    }

    /// Read the full target of a symlink.
    fn read_link(&self, path: &Path) -> Result<PathBuf, StoreError> {
        let mut buf = vec![0u8; 256];
        loop {
            let n = self.readlink(path, &mut buf)?;
            if n < buf.len() {
                buf.truncate(n);
                return Ok(PathBuf::from(OsStr::from_bytes(&buf)));
            }
            // Possibly truncated; retry with room to spare.
            let grown = buf.len() * 2;
            buf.resize(grown, 0);
        }
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

// =============================================================================
// JSON Support (Feature-Gated)
// =============================================================================

#[cfg(feature = "serde")]
mod json {
    use super::*;
    use serde::{Serialize, de::DeserializeOwned};

    /// Failure of a JSON read or write.
    #[derive(Debug, thiserror::Error)]
    pub enum JsonError {
        /// The store operation failed.
        #[error(transparent)]
        Store(#[from] StoreError),
        /// The document could not be (de)serialized.
        #[error("json error: {0}")]
        Json(#[from] serde_json::Error),
    }

    /// JSON serialization extension methods.
    ///
    /// Available when the `serde` feature is enabled.
    ///
    /// ```rust
    /// # #[cfg(feature = "serde")]
    /// # {
    /// use iostore::{PosixStore, StoreExtJson};
    ///
    /// let dir = tempfile::tempdir().unwrap();
    /// let store = PosixStore::new();
    /// let path = dir.path().join("limits.json");
    ///
    /// store.write_json(&path, &vec![1, 2, 3]).unwrap();
    /// let back: Vec<u32> = store.read_json(&path).unwrap();
    /// assert_eq!(back, vec![1, 2, 3]);
    /// # }
    /// ```
    pub trait StoreExtJson: Store {
        /// Read a file and deserialize it as JSON.
        fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, JsonError> {
            let data = self.read_all(path)?;
            Ok(serde_json::from_slice(&data)?)
        }

        /// Serialize a value and write it as pretty-printed JSON.
        fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), JsonError> {
            let json = serde_json::to_vec_pretty(value)?;
            Ok(self.write_all(path, &json)?)
        }
    }

    impl<S: Store + ?Sized> StoreExtJson for S {}
}

#[cfg(feature = "serde")]
pub use json::{JsonError, StoreExtJson};
