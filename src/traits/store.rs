//! Namespace and factory operations.

use std::path::Path;

use crate::{
    AccessMode, DirHandle, FileTimes, Handle, Metadata, OpenFlags, Ownership, Permissions, StatFs,
    StoreError,
};

/// The factory and namespace half of a storage backend.
///
/// A `Store` creates [`Handle`]s and [`DirHandle`]s and performs path-level
/// operations that need no open handle. Each operation performs exactly one
/// underlying action and surfaces its failure immediately: no retries, no
/// fallback to another backend.
///
/// # Thread Safety
///
/// Stores are `Send + Sync` and take `&self`; every call is independent and
/// produces an independently owned object, so a single store can serve
/// concurrent callers.
///
/// # Object Safety
///
/// This trait is object-safe; backend selection usually happens once, by
/// constructing an `Arc<dyn Store>`.
///
/// # Optional Operations
///
/// Operations with a default body fail with
/// [`ErrorKind::Unsupported`](crate::ErrorKind::Unsupported) unless the
/// backend overrides them.
///
/// # Example
///
/// ```rust
/// use iostore::{Store, StoreError, OpenFlags, Permissions};
/// use std::path::Path;
///
/// fn create_empty(store: &dyn Store, path: &Path) -> Result<(), StoreError> {
///     let handle = store.open(path, OpenFlags::WRITE, Permissions::default_file())?;
///     handle.close()
/// }
/// ```
pub trait Store: Send + Sync {
    /// Open (and possibly create) the resource at `path`.
    ///
    /// `flags` and `permissions` go to the backend unchanged. On failure no
    /// handle exists. If the backend cannot admit the handle after the
    /// underlying open succeeded, it closes what it opened and fails with
    /// [`ErrorKind::ResourceExhausted`](crate::ErrorKind::ResourceExhausted).
    fn open(
        &self,
        path: &Path,
        flags: OpenFlags,
        permissions: Permissions,
    ) -> Result<Box<dyn Handle>, StoreError>;

    /// Open a directory stream. Same failure rules as [`open`](Store::open).
    fn opendir(&self, path: &Path) -> Result<Box<dyn DirHandle>, StoreError>;

    /// Check accessibility of `path` for the calling process.
    fn access(&self, path: &Path, mode: AccessMode) -> Result<(), StoreError>;

    /// Change permission bits.
    fn chmod(&self, path: &Path, permissions: Permissions) -> Result<(), StoreError>;

    /// Change ownership, following symlinks.
    fn chown(&self, path: &Path, owner: Ownership) -> Result<(), StoreError>;

    /// Change ownership of a symlink itself.
    fn lchown(&self, path: &Path, _owner: Ownership) -> Result<(), StoreError> {
        Err(StoreError::unsupported("lchown", path))
    }

    /// Create a hard link at `link` to `original`.
    fn link(&self, original: &Path, _link: &Path) -> Result<(), StoreError> {
        Err(StoreError::unsupported("link", original))
    }

    /// Metadata of `path`, following symlinks.
    fn stat(&self, path: &Path) -> Result<Metadata, StoreError>;

    /// Metadata of `path` itself, without following a final symlink.
    fn lstat(&self, path: &Path) -> Result<Metadata, StoreError>;

    /// Statistics of the filesystem containing `path`.
    fn statvfs(&self, path: &Path) -> Result<StatFs, StoreError> {
        Err(StoreError::unsupported("statvfs", path))
    }

    /// Create a directory.
    fn mkdir(&self, path: &Path, permissions: Permissions) -> Result<(), StoreError>;

    /// Create a filesystem node. `mode` carries the file type bits as well
    /// as the permission bits; `dev` is used for device nodes.
    fn mknod(&self, path: &Path, _mode: u32, _dev: u64) -> Result<(), StoreError> {
        Err(StoreError::unsupported("mknod", path))
    }

    /// Read the target of a symlink into `buf`.
    ///
    /// The target is truncated to `buf.len()` bytes and is not
    /// NUL-terminated. Returns the number of bytes written.
    fn readlink(&self, path: &Path, _buf: &mut [u8]) -> Result<usize, StoreError> {
        Err(StoreError::unsupported("readlink", path))
    }

    /// Rename `from` to `to`.
    fn rename(&self, from: &Path, to: &Path) -> Result<(), StoreError>;

    /// Remove an empty directory.
    fn rmdir(&self, path: &Path) -> Result<(), StoreError>;

    /// Create a symlink at `link` pointing to `target`.
    fn symlink(&self, _target: &Path, link: &Path) -> Result<(), StoreError> {
        Err(StoreError::unsupported("symlink", link))
    }

    /// Resize the file at `path`.
    fn truncate(&self, path: &Path, length: u64) -> Result<(), StoreError>;

    /// Remove a non-directory entry.
    fn unlink(&self, path: &Path) -> Result<(), StoreError>;

    /// Set access and modification times; `None` sets both to now.
    fn utime(&self, path: &Path, _times: Option<FileTimes>) -> Result<(), StoreError> {
        Err(StoreError::unsupported("utime", path))
    }
}
