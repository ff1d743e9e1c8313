//! # POSIX Backend
//!
//! Direct pass-through to the kernel: every operation is exactly one system
//! call, its result translated at the boundary with [`Errno::result`].
//!
//! ```rust
//! use iostore::{OpenFlags, Permissions, PosixStore, Store, Whence};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = PosixStore::new();
//! let path = dir.path().join("greeting");
//!
//! let handle = store
//!     .open(&path, OpenFlags::READ_WRITE | OpenFlags::CREATE, Permissions::default_file())
//!     .unwrap();
//! handle.write(b"hello").unwrap();
//! handle.lseek(0, Whence::Set).unwrap();
//! let mut buf = [0u8; 5];
//! handle.read(&mut buf).unwrap();
//! assert_eq!(&buf, b"hello");
//! handle.close().unwrap();
//! ```

mod dir;
mod handle;

pub use dir::PosixDirHandle;
pub use handle::PosixHandle;

use std::ffi::{CString, OsString};
use std::mem::MaybeUninit;
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nix::errno::Errno;

use crate::accounting::Counter;
use crate::{
    AccessMode, DirHandle, FileTimes, FileType, Handle, Metadata, OpenFlags, Ownership,
    Permissions, StatFs, Store, StoreConfig, StoreError,
};

/// Store backed directly by the host kernel.
///
/// Holds only admission counters; it is `Send + Sync` and meant to be
/// shared (for example as an `Arc<dyn Store>`), not copied.
#[derive(Debug)]
pub struct PosixStore {
    handles: Counter,
    dirs: Counter,
}

impl PosixStore {
    /// A store with no admission limits.
    pub fn new() -> Self {
        Self::with_config(&StoreConfig::default())
    }

    /// A store applying `config`.
    pub fn with_config(config: &StoreConfig) -> Self {
        let counter = |limit: Option<usize>| limit.map_or_else(Counter::new, Counter::bounded);
        Self {
            handles: counter(config.handle_limit),
            dirs: counter(config.dir_limit),
        }
    }

    /// Number of handles from this store that are still open.
    pub fn open_handles(&self) -> usize {
        self.handles.live()
    }

    /// Number of directory streams from this store that are still open.
    pub fn open_dirs(&self) -> usize {
        self.dirs.live()
    }

    /// Like [`Store::open`], returning the concrete handle.
    pub fn open_file(
        &self,
        path: &Path,
        flags: OpenFlags,
        permissions: Permissions,
    ) -> Result<PosixHandle, StoreError> {
        let c = c_path("open", path)?;
        // SAFETY: `c` is a valid NUL-terminated string.
        let raw = unsafe {
            libc::open(
                c.as_ptr(),
                flags.bits(),
                permissions.mode() as libc::c_uint,
            )
        };
        let raw = Errno::result(raw).map_err(|e| StoreError::new("open", path, e))?;
        // SAFETY: `raw` was just returned by a successful open and has no
        // other owner.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };
        PosixHandle::admit(fd, path, &self.handles)
    }

    /// Like [`Store::opendir`], returning the concrete handle.
    pub fn open_dir(&self, path: &Path) -> Result<PosixDirHandle, StoreError> {
        let c = c_path("opendir", path)?;
        // SAFETY: `c` is a valid NUL-terminated string.
        let dp = unsafe { libc::opendir(c.as_ptr()) };
        let Some(dp) = NonNull::new(dp) else {
            return Err(StoreError::new("opendir", path, Errno::last()));
        };
        // SAFETY: `dp` was just returned by a successful opendir.
        let stream = unsafe { dir::DirStream::from_raw(dp) };
        PosixDirHandle::admit(stream, path, &self.dirs)
    }
}

impl Default for PosixStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for PosixStore {
    fn open(
        &self,
        path: &Path,
        flags: OpenFlags,
        permissions: Permissions,
    ) -> Result<Box<dyn Handle>, StoreError> {
        Ok(Box::new(self.open_file(path, flags, permissions)?))
    }

    fn opendir(&self, path: &Path) -> Result<Box<dyn DirHandle>, StoreError> {
        Ok(Box::new(self.open_dir(path)?))
    }

    fn access(&self, path: &Path, mode: AccessMode) -> Result<(), StoreError> {
        let c = c_path("access", path)?;
        // SAFETY: valid C string.
        check("access", path, unsafe { libc::access(c.as_ptr(), mode.bits()) })
    }

    fn chmod(&self, path: &Path, permissions: Permissions) -> Result<(), StoreError> {
        let c = c_path("chmod", path)?;
        // SAFETY: valid C string.
        check("chmod", path, unsafe {
            libc::chmod(c.as_ptr(), permissions.mode() as libc::mode_t)
        })
    }

    fn chown(&self, path: &Path, owner: Ownership) -> Result<(), StoreError> {
        let c = c_path("chown", path)?;
        let (uid, gid) = raw_owner(owner);
        // SAFETY: valid C string.
        check("chown", path, unsafe { libc::chown(c.as_ptr(), uid, gid) })
    }

    fn lchown(&self, path: &Path, owner: Ownership) -> Result<(), StoreError> {
        let c = c_path("lchown", path)?;
        let (uid, gid) = raw_owner(owner);
        // SAFETY: valid C string.
        check("lchown", path, unsafe { libc::lchown(c.as_ptr(), uid, gid) })
    }

    fn link(&self, original: &Path, link: &Path) -> Result<(), StoreError> {
        let from = c_path("link", original)?;
        let to = c_path("link", link)?;
        // SAFETY: valid C strings.
        check("link", link, unsafe { libc::link(from.as_ptr(), to.as_ptr()) })
    }

    fn stat(&self, path: &Path) -> Result<Metadata, StoreError> {
        let c = c_path("stat", path)?;
        let mut st = MaybeUninit::<libc::stat>::uninit();
        // SAFETY: valid C string and a writable stat buffer.
        check("stat", path, unsafe { libc::stat(c.as_ptr(), st.as_mut_ptr()) })?;
        // SAFETY: stat succeeded and filled the buffer.
        let st = unsafe { st.assume_init() };
        Ok(metadata_from_stat(&st))
    }

    fn lstat(&self, path: &Path) -> Result<Metadata, StoreError> {
        let c = c_path("lstat", path)?;
        let mut st = MaybeUninit::<libc::stat>::uninit();
        // SAFETY: valid C string and a writable stat buffer.
        check("lstat", path, unsafe { libc::lstat(c.as_ptr(), st.as_mut_ptr()) })?;
        // SAFETY: lstat succeeded and filled the buffer.
        let st = unsafe { st.assume_init() };
        Ok(metadata_from_stat(&st))
    }

    fn statvfs(&self, path: &Path) -> Result<StatFs, StoreError> {
        let c = c_path("statvfs", path)?;
        let mut sv = MaybeUninit::<libc::statvfs>::uninit();
        // SAFETY: valid C string and a writable statvfs buffer.
        check("statvfs", path, unsafe {
            libc::statvfs(c.as_ptr(), sv.as_mut_ptr())
        })?;
        // SAFETY: statvfs succeeded and filled the buffer.
        let sv = unsafe { sv.assume_init() };
        Ok(statfs_from_statvfs(&sv))
    }

    fn mkdir(&self, path: &Path, permissions: Permissions) -> Result<(), StoreError> {
        let c = c_path("mkdir", path)?;
        // SAFETY: valid C string.
        check("mkdir", path, unsafe {
            libc::mkdir(c.as_ptr(), permissions.mode() as libc::mode_t)
        })
    }

    fn mknod(&self, path: &Path, mode: u32, dev: u64) -> Result<(), StoreError> {
        let c = c_path("mknod", path)?;
        // SAFETY: valid C string.
        check("mknod", path, unsafe {
            libc::mknod(c.as_ptr(), mode as libc::mode_t, dev as libc::dev_t)
        })
    }

    fn readlink(&self, path: &Path, buf: &mut [u8]) -> Result<usize, StoreError> {
        let c = c_path("readlink", path)?;
        // SAFETY: valid C string; the kernel writes at most `buf.len()` bytes.
        let rv = unsafe { libc::readlink(c.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) };
        let n = Errno::result(rv).map_err(|e| StoreError::new("readlink", path, e))?;
        Ok(n as usize)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<(), StoreError> {
        let old = c_path("rename", from)?;
        let new = c_path("rename", to)?;
        // SAFETY: valid C strings.
        check("rename", from, unsafe { libc::rename(old.as_ptr(), new.as_ptr()) })
    }

    fn rmdir(&self, path: &Path) -> Result<(), StoreError> {
        let c = c_path("rmdir", path)?;
        // SAFETY: valid C string.
        check("rmdir", path, unsafe { libc::rmdir(c.as_ptr()) })
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<(), StoreError> {
        let to = c_path("symlink", target)?;
        let at = c_path("symlink", link)?;
        // SAFETY: valid C strings.
        check("symlink", link, unsafe { libc::symlink(to.as_ptr(), at.as_ptr()) })
    }

    fn truncate(&self, path: &Path, length: u64) -> Result<(), StoreError> {
        let c = c_path("truncate", path)?;
        let length = to_off("truncate", path, length)?;
        // SAFETY: valid C string.
        check("truncate", path, unsafe { libc::truncate(c.as_ptr(), length) })
    }

    fn unlink(&self, path: &Path) -> Result<(), StoreError> {
        let c = c_path("unlink", path)?;
        // SAFETY: valid C string.
        check("unlink", path, unsafe { libc::unlink(c.as_ptr()) })
    }

    fn utime(&self, path: &Path, times: Option<FileTimes>) -> Result<(), StoreError> {
        let c = c_path("utime", path)?;
        let buf = times.map(|t| libc::utimbuf {
            actime: unix_seconds(t.accessed) as libc::time_t,
            modtime: unix_seconds(t.modified) as libc::time_t,
        });
        let ptr = buf
            .as_ref()
            .map_or(std::ptr::null(), |b| b as *const libc::utimbuf);
        // SAFETY: valid C string; `ptr` is null or points at `buf`, which
        // outlives the call.
        check("utime", path, unsafe { libc::utime(c.as_ptr(), ptr) })
    }
}

/// Translate a `0 / -1 + errno` return into a result.
fn check(operation: &'static str, path: &Path, rv: libc::c_int) -> Result<(), StoreError> {
    Errno::result(rv)
        .map(drop)
        .map_err(|e| StoreError::new(operation, path, e))
}

fn c_path(operation: &'static str, path: &Path) -> Result<CString, StoreError> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|_| StoreError::new(operation, path, Errno::EINVAL))
}

/// Copy a path without aborting on allocation failure.
fn owned_path(operation: &'static str, path: &Path) -> Result<PathBuf, StoreError> {
    let mut copy = OsString::new();
    copy.try_reserve_exact(path.as_os_str().len())
        .map_err(|_| StoreError::new(operation, path, Errno::ENOMEM))?;
    copy.push(path.as_os_str());
    Ok(PathBuf::from(copy))
}

fn to_off(operation: &'static str, path: &Path, value: u64) -> Result<libc::off_t, StoreError> {
    libc::off_t::try_from(value).map_err(|_| StoreError::new(operation, path, Errno::EINVAL))
}

fn raw_owner(owner: Ownership) -> (libc::uid_t, libc::gid_t) {
    (
        owner.uid.map_or(libc::uid_t::MAX, |u| u as libc::uid_t),
        owner.gid.map_or(libc::gid_t::MAX, |g| g as libc::gid_t),
    )
}

fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    }
}

fn system_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = Duration::from_nanos(nsecs.clamp(0, 999_999_999) as u64);
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64) + nanos
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

pub(crate) fn metadata_from_stat(st: &libc::stat) -> Metadata {
    let mode = st.st_mode as u32;
    Metadata {
        file_type: FileType::from_mode(mode),
        size: st.st_size as u64,
        permissions: Permissions::from_mode(mode),
        inode: st.st_ino as u64,
        nlink: st.st_nlink as u64,
        uid: st.st_uid,
        gid: st.st_gid,
        dev: st.st_dev as u64,
        rdev: st.st_rdev as u64,
        block_size: st.st_blksize as u64,
        blocks: st.st_blocks as u64,
        accessed: system_time(st.st_atime as i64, st.st_atime_nsec as i64),
        modified: system_time(st.st_mtime as i64, st.st_mtime_nsec as i64),
        changed: system_time(st.st_ctime as i64, st.st_ctime_nsec as i64),
    }
}

fn statfs_from_statvfs(sv: &libc::statvfs) -> StatFs {
    let frsize = sv.f_frsize as u64;
    StatFs {
        block_size: sv.f_bsize as u64,
        fragment_size: frsize,
        total_bytes: (sv.f_blocks as u64).saturating_mul(frsize),
        free_bytes: (sv.f_bfree as u64).saturating_mul(frsize),
        available_bytes: (sv.f_bavail as u64).saturating_mul(frsize),
        total_inodes: sv.f_files as u64,
        free_inodes: sv.f_ffree as u64,
        available_inodes: sv.f_favail as u64,
        max_name_len: sv.f_namemax as u64,
    }
}
