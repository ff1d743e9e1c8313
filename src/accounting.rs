//! # Resource Accounting
//!
//! Counters that pair every acquisition with exactly one release.
//!
//! A [`Counter`] hands out [`Slot`]s; a slot gives its unit back when it is
//! dropped, so the count stays correct on every exit path. Backends use a
//! bounded counter for admission control, and [`AccountingLayer`] wraps any
//! [`Store`] to track what it has handed out and not yet released.
//!
//! ```rust
//! use iostore::{AccountingLayer, LayerExt, OpenFlags, Permissions, PosixStore, Store};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let layer = AccountingLayer::new();
//! let ledger = layer.ledger();
//! let store = PosixStore::new().layer(layer);
//!
//! let handle = store
//!     .open(&dir.path().join("f"), OpenFlags::WRITE, Permissions::default_file())
//!     .unwrap();
//! assert_eq!(ledger.outstanding().handles, 1);
//! handle.close().unwrap();
//! assert!(ledger.is_balanced());
//! ```

use std::path::Path;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{
    AccessMode, DirEntry, DirHandle, FileTimes, Handle, Layer, MapFlags, MappedRegion, Metadata,
    OpenFlags, Ownership, Permissions, Protection, StatFs, Store, StoreError, Whence,
};

/// A shared count of live resources, optionally bounded.
#[derive(Debug, Clone)]
pub struct Counter {
    live: Arc<AtomicUsize>,
    limit: Option<usize>,
}

impl Counter {
    /// An unbounded counter.
    pub fn new() -> Self {
        Self {
            live: Arc::new(AtomicUsize::new(0)),
            limit: None,
        }
    }

    /// A counter that refuses to go above `limit`.
    pub fn bounded(limit: usize) -> Self {
        Self {
            live: Arc::new(AtomicUsize::new(0)),
            limit: Some(limit),
        }
    }

    /// Take a slot, or `None` if the limit is reached.
    pub fn acquire(&self) -> Option<Slot> {
        let limit = self.limit.unwrap_or(usize::MAX);
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .ok()
            .map(|_| Slot {
                live: Arc::clone(&self.live),
            })
    }

    /// Number of slots currently held.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// One unit of a [`Counter`], returned when dropped.
#[derive(Debug)]
pub struct Slot {
    live: Arc<AtomicUsize>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Snapshot of unreleased resources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outstanding {
    /// Open file handles.
    pub handles: usize,
    /// Open directory streams.
    pub dirs: usize,
    /// Established mappings.
    pub mappings: usize,
}

/// Live counts shared between an [`AccountingLayer`] and the store it built.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    handles: Counter,
    dirs: Counter,
    mappings: Counter,
}

impl Ledger {
    /// Resources handed out and not yet released.
    pub fn outstanding(&self) -> Outstanding {
        Outstanding {
            handles: self.handles.live(),
            dirs: self.dirs.live(),
            mappings: self.mappings.live(),
        }
    }

    /// `true` when every acquisition has been released.
    pub fn is_balanced(&self) -> bool {
        self.outstanding() == Outstanding::default()
    }
}

/// Layer that wraps a store in an [`Accounted`] leak detector.
#[derive(Debug, Default)]
pub struct AccountingLayer {
    ledger: Ledger,
}

impl AccountingLayer {
    /// A layer with a fresh ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// The ledger the wrapped store will report to.
    pub fn ledger(&self) -> Ledger {
        self.ledger.clone()
    }
}

impl<S: Store> Layer<S> for AccountingLayer {
    type Store = Accounted<S>;

    fn layer(self, store: S) -> Self::Store {
        Accounted {
            inner: store,
            ledger: self.ledger,
        }
    }
}

/// A store whose handles, directory streams, and mappings are counted.
pub struct Accounted<S> {
    inner: S,
    ledger: Ledger,
}

impl<S> Accounted<S> {
    /// The ledger for this store.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }
}

fn untracked(operation: &'static str, path: &Path) -> StoreError {
    StoreError::new(operation, path, nix::errno::Errno::ENOMEM)
}

impl<S: Store> Store for Accounted<S> {
    fn open(
        &self,
        path: &Path,
        flags: OpenFlags,
        permissions: Permissions,
    ) -> Result<Box<dyn Handle>, StoreError> {
        let inner = self.inner.open(path, flags, permissions)?;
        // The counter is unbounded, so this only fails on overflow; the
        // inner handle is released by drop in that case.
        let slot = self
            .ledger
            .handles
            .acquire()
            .ok_or_else(|| untracked("open", path))?;
        Ok(Box::new(AccountedHandle {
            inner,
            mappings: self.ledger.mappings.clone(),
            _slot: slot,
        }))
    }

    fn opendir(&self, path: &Path) -> Result<Box<dyn DirHandle>, StoreError> {
        let inner = self.inner.opendir(path)?;
        let slot = self
            .ledger
            .dirs
            .acquire()
            .ok_or_else(|| untracked("opendir", path))?;
        Ok(Box::new(AccountedDir { inner, _slot: slot }))
    }

    fn access(&self, path: &Path, mode: AccessMode) -> Result<(), StoreError> {
        self.inner.access(path, mode)
    }

    fn chmod(&self, path: &Path, permissions: Permissions) -> Result<(), StoreError> {
        self.inner.chmod(path, permissions)
    }

    fn chown(&self, path: &Path, owner: Ownership) -> Result<(), StoreError> {
        self.inner.chown(path, owner)
    }

    fn lchown(&self, path: &Path, owner: Ownership) -> Result<(), StoreError> {
        self.inner.lchown(path, owner)
    }

    fn link(&self, original: &Path, link: &Path) -> Result<(), StoreError> {
        self.inner.link(original, link)
    }

    fn lstat(&self, path: &Path) -> Result<Metadata, StoreError> {
        self.inner.lstat(path)
    }

    fn mkdir(&self, path: &Path, permissions: Permissions) -> Result<(), StoreError> {
        self.inner.mkdir(path, permissions)
    }

    fn mknod(&self, path: &Path, mode: u32, dev: u64) -> Result<(), StoreError> {
        self.inner.mknod(path, mode, dev)
    }

    fn readlink(&self, path: &Path, buf: &mut [u8]) -> Result<usize, StoreError> {
        self.inner.readlink(path, buf)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StoreError> {
        self.inner.rename(from, to)
    }

    fn rmdir(&self, path: &Path) -> Result<(), StoreError> {
        self.inner.rmdir(path)
    }

    fn stat(&self, path: &Path) -> Result<Metadata, StoreError> {
        self.inner.stat(path)
    }

    fn statvfs(&self, path: &Path) -> Result<StatFs, StoreError> {
        self.inner.statvfs(path)
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<(), StoreError> {
        self.inner.symlink(target, link)
    }

    fn truncate(&self, path: &Path, length: u64) -> Result<(), StoreError> {
        self.inner.truncate(path, length)
    }

    fn unlink(&self, path: &Path) -> Result<(), StoreError> {
        self.inner.unlink(path)
    }

    fn utime(&self, path: &Path, times: Option<FileTimes>) -> Result<(), StoreError> {
        self.inner.utime(path, times)
    }
}

struct AccountedHandle {
    inner: Box<dyn Handle>,
    mappings: Counter,
    _slot: Slot,
}

impl Handle for AccountedHandle {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, StoreError> {
        self.inner.read(buf)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, StoreError> {
        self.inner.write(buf)
    }

    fn pread(&self, buf: &mut [u8], offset: u64) -> Result<usize, StoreError> {
        self.inner.pread(buf, offset)
    }

    fn pwrite(&self, buf: &[u8], offset: u64) -> Result<usize, StoreError> {
        self.inner.pwrite(buf, offset)
    }

    fn lseek(&self, offset: i64, whence: Whence) -> Result<u64, StoreError> {
        self.inner.lseek(offset, whence)
    }

    fn fstat(&self) -> Result<Metadata, StoreError> {
        self.inner.fstat()
    }

    fn fsync(&self) -> Result<(), StoreError> {
        self.inner.fsync()
    }

    fn ftruncate(&self, length: u64) -> Result<(), StoreError> {
        self.inner.ftruncate(length)
    }

    unsafe fn mmap(
        &self,
        addr_hint: Option<NonNull<libc::c_void>>,
        len: usize,
        prot: Protection,
        flags: MapFlags,
        offset: u64,
    ) -> Result<MappedRegion, StoreError> {
        // SAFETY: forwarded under the caller's obligations.
        let region = unsafe { self.inner.mmap(addr_hint, len, prot, flags, offset)? };
        match self.mappings.acquire() {
            Some(slot) => Ok(region.with_slot(slot)),
            None => Err(untracked("mmap", self.inner.path())),
        }
    }

    fn munmap(&self, region: MappedRegion) -> Result<(), StoreError> {
        self.inner.munmap(region)
    }

    fn close(self: Box<Self>) -> Result<(), StoreError> {
        let AccountedHandle { inner, _slot, .. } = *self;
        inner.close()
    }
}

struct AccountedDir {
    inner: Box<dyn DirHandle>,
    _slot: Slot,
}

impl DirHandle for AccountedDir {
    fn path(&self) -> &Path {
        self.inner.path()
    }

    fn read_next(&mut self) -> Result<Option<DirEntry>, StoreError> {
        self.inner.read_next()
    }

    fn closedir(self: Box<Self>) -> Result<(), StoreError> {
        let AccountedDir { inner, _slot } = *self;
        inner.closedir()
    }
}
