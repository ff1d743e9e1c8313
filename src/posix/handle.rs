use std::ffi::c_void;
use std::mem::MaybeUninit;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use nix::errno::Errno;
use tracing::{debug, warn};

use super::{metadata_from_stat, owned_path, to_off};
use crate::accounting::{Counter, Slot};
use crate::{Handle, MapFlags, MappedRegion, Metadata, Protection, StoreError, Whence};

/// A file descriptor opened by [`PosixStore`](super::PosixStore).
///
/// Dropping an unclosed handle closes the descriptor and logs a warning.
#[derive(Debug)]
pub struct PosixHandle {
    fd: Option<OwnedFd>,
    path: PathBuf,
    _slot: Slot,
}

impl PosixHandle {
    /// Wrap a freshly opened descriptor. On failure `fd` is dropped, which
    /// closes it.
    pub(super) fn admit(fd: OwnedFd, path: &Path, counter: &Counter) -> Result<Self, StoreError> {
        let Some(slot) = counter.acquire() else {
            debug!(path = %path.display(), "handle limit reached, closing descriptor");
            return Err(StoreError::new("open", path, Errno::ENOMEM));
        };
        let path = owned_path("open", path)?;
        debug!(path = %path.display(), fd = fd.as_raw_fd(), "open");
        Ok(Self {
            fd: Some(fd),
            path,
            _slot: slot,
        })
    }

    fn raw(&self) -> RawFd {
        self.fd.as_ref().map_or(-1, AsRawFd::as_raw_fd)
    }

    fn fail(&self, operation: &'static str, errno: Errno) -> StoreError {
        StoreError::new(operation, &self.path, errno)
    }

    fn count(&self, operation: &'static str, rv: isize) -> Result<usize, StoreError> {
        Errno::result(rv)
            .map(|n| n as usize)
            .map_err(|e| self.fail(operation, e))
    }

    fn unit(&self, operation: &'static str, rv: libc::c_int) -> Result<(), StoreError> {
        Errno::result(rv).map(drop).map_err(|e| self.fail(operation, e))
    }
}

impl AsRawFd for PosixHandle {
    fn as_raw_fd(&self) -> RawFd {
        self.raw()
    }
}

fn close_fd(fd: OwnedFd) -> Result<(), Errno> {
    // SAFETY: ownership of the descriptor moves into close.
    Errno::result(unsafe { libc::close(fd.into_raw_fd()) }).map(drop)
}

impl Handle for PosixHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize, StoreError> {
        // SAFETY: `buf` is writable for `buf.len()` bytes.
        let rv = unsafe { libc::read(self.raw(), buf.as_mut_ptr().cast(), buf.len()) };
        self.count("read", rv)
    }

    fn write(&self, buf: &[u8]) -> Result<usize, StoreError> {
        // SAFETY: `buf` is readable for `buf.len()` bytes.
        let rv = unsafe { libc::write(self.raw(), buf.as_ptr().cast(), buf.len()) };
        self.count("write", rv)
    }

    fn pread(&self, buf: &mut [u8], offset: u64) -> Result<usize, StoreError> {
        let offset = to_off("pread", &self.path, offset)?;
        // SAFETY: `buf` is writable for `buf.len()` bytes.
        let rv = unsafe { libc::pread(self.raw(), buf.as_mut_ptr().cast(), buf.len(), offset) };
        self.count("pread", rv)
    }

    fn pwrite(&self, buf: &[u8], offset: u64) -> Result<usize, StoreError> {
        let offset = to_off("pwrite", &self.path, offset)?;
        // SAFETY: `buf` is readable for `buf.len()` bytes.
        let rv = unsafe { libc::pwrite(self.raw(), buf.as_ptr().cast(), buf.len(), offset) };
        self.count("pwrite", rv)
    }

    fn lseek(&self, offset: i64, whence: Whence) -> Result<u64, StoreError> {
        let offset = libc::off_t::try_from(offset).map_err(|_| self.fail("lseek", Errno::EINVAL))?;
        // SAFETY: plain descriptor call.
        let rv = unsafe { libc::lseek(self.raw(), offset, whence.as_raw()) };
        Errno::result(rv)
            .map(|pos| pos as u64)
            .map_err(|e| self.fail("lseek", e))
    }

    fn fstat(&self) -> Result<Metadata, StoreError> {
        let mut st = MaybeUninit::<libc::stat>::uninit();
        // SAFETY: `st` is a writable stat buffer.
        self.unit("fstat", unsafe { libc::fstat(self.raw(), st.as_mut_ptr()) })?;
        // SAFETY: fstat succeeded and filled the buffer.
        let st = unsafe { st.assume_init() };
        Ok(metadata_from_stat(&st))
    }

    fn fsync(&self) -> Result<(), StoreError> {
        // SAFETY: plain descriptor call.
        self.unit("fsync", unsafe { libc::fsync(self.raw()) })
    }

    fn ftruncate(&self, length: u64) -> Result<(), StoreError> {
        let length = to_off("ftruncate", &self.path, length)?;
        // SAFETY: plain descriptor call.
        self.unit("ftruncate", unsafe { libc::ftruncate(self.raw(), length) })
    }

    unsafe fn mmap(
        &self,
        addr_hint: Option<NonNull<c_void>>,
        len: usize,
        prot: Protection,
        flags: MapFlags,
        offset: u64,
    ) -> Result<MappedRegion, StoreError> {
        let offset = to_off("mmap", &self.path, offset)?;
        let hint = addr_hint.map_or(std::ptr::null_mut(), NonNull::as_ptr);
        // SAFETY: the caller upholds the placement and aliasing obligations
        // of `Handle::mmap`.
        let addr = unsafe { libc::mmap(hint, len, prot.bits(), flags.bits(), self.raw(), offset) };
        if addr == libc::MAP_FAILED {
            return Err(self.fail("mmap", Errno::last()));
        }
        let Some(addr) = NonNull::new(addr) else {
            // A fixed mapping at address zero cannot be represented.
            // SAFETY: the range was just mapped and is owned by nothing else.
            unsafe { libc::munmap(addr, len) };
            return Err(self.fail("mmap", Errno::EINVAL));
        };
        debug!(path = %self.path.display(), len, "mmap");
        // SAFETY: `addr`/`len` describe the mapping just established.
        Ok(unsafe { MappedRegion::from_raw(addr, len, &self.path) })
    }

    fn close(mut self: Box<Self>) -> Result<(), StoreError> {
        let Some(fd) = self.fd.take() else {
            return Err(self.fail("close", Errno::EBADF));
        };
        let raw = fd.as_raw_fd();
        close_fd(fd).map_err(|e| self.fail("close", e))?;
        debug!(path = %self.path.display(), fd = raw, "close");
        Ok(())
    }
}

impl Drop for PosixHandle {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            warn!(path = %self.path.display(), fd = fd.as_raw_fd(), "handle dropped without close");
            if let Err(e) = close_fd(fd) {
                warn!(path = %self.path.display(), error = %e, "close during drop failed");
            }
        }
    }
}
