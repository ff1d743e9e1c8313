use std::ffi::{CStr, OsStr};
use std::mem::ManuallyDrop;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use nix::errno::Errno;
use tracing::{debug, warn};

use super::owned_path;
use crate::accounting::{Counter, Slot};
use crate::{DirEntry, DirHandle, FileType, StoreError};

/// Owned `DIR*`, closed on drop.
#[derive(Debug)]
pub(super) struct DirStream(NonNull<libc::DIR>);

impl DirStream {
    /// # Safety
    ///
    /// `dp` must come from a successful `opendir` and have no other owner.
    pub(super) unsafe fn from_raw(dp: NonNull<libc::DIR>) -> Self {
        Self(dp)
    }

    fn close(self) -> Result<(), Errno> {
        let this = ManuallyDrop::new(self);
        // SAFETY: the stream is owned and closed exactly once; Drop is
        // suppressed.
        Errno::result(unsafe { libc::closedir(this.0.as_ptr()) }).map(drop)
    }
}

impl Drop for DirStream {
    fn drop(&mut self) {
        // SAFETY: the stream is owned and closed exactly once.
        unsafe { libc::closedir(self.0.as_ptr()) };
    }
}

// SAFETY: a DIR stream may move between threads; it is only used through
// `&mut` access.
unsafe impl Send for DirStream {}

/// A directory stream opened by [`PosixStore`](super::PosixStore).
///
/// Entries come straight from the kernel, `.` and `..` included.
#[derive(Debug)]
pub struct PosixDirHandle {
    stream: Option<DirStream>,
    path: PathBuf,
    _slot: Slot,
}

impl PosixDirHandle {
    pub(super) fn admit(
        stream: DirStream,
        path: &Path,
        counter: &Counter,
    ) -> Result<Self, StoreError> {
        let Some(slot) = counter.acquire() else {
            debug!(path = %path.display(), "directory limit reached, closing stream");
            return Err(StoreError::new("opendir", path, Errno::ENOMEM));
        };
        let path = owned_path("opendir", path)?;
        debug!(path = %path.display(), "opendir");
        Ok(Self {
            stream: Some(stream),
            path,
            _slot: slot,
        })
    }
}

fn file_type(d_type: u8) -> FileType {
    match d_type {
        libc::DT_REG => FileType::File,
        libc::DT_DIR => FileType::Directory,
        libc::DT_LNK => FileType::Symlink,
        libc::DT_BLK => FileType::BlockDevice,
        libc::DT_CHR => FileType::CharDevice,
        libc::DT_FIFO => FileType::Fifo,
        libc::DT_SOCK => FileType::Socket,
        _ => FileType::Unknown,
    }
}

impl DirHandle for PosixDirHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn read_next(&mut self) -> Result<Option<DirEntry>, StoreError> {
        let Some(stream) = self.stream.as_ref() else {
            return Err(StoreError::new("readdir", &self.path, Errno::EBADF));
        };
        // readdir signals end of stream and failure the same way; only
        // errno tells them apart.
        Errno::clear();
        // SAFETY: the stream is open and accessed exclusively via `&mut self`.
        let ent = unsafe { libc::readdir(stream.0.as_ptr()) };
        if ent.is_null() {
            return match Errno::last() {
                Errno::UnknownErrno => Ok(None),
                e => Err(StoreError::new("readdir", &self.path, e)),
            };
        }
        // SAFETY: a non-null dirent stays valid until the next readdir on
        // this stream; it is copied out before returning.
        let ent = unsafe { &*ent };
        // SAFETY: d_name is NUL-terminated.
        let raw = unsafe { CStr::from_ptr(ent.d_name.as_ptr()) };
        Ok(Some(DirEntry {
            path: self.path.join(OsStr::from_bytes(raw.to_bytes())),
            name: raw.to_string_lossy().into_owned(),
            file_type: file_type(ent.d_type),
            inode: ent.d_ino as u64,
        }))
    }

    fn closedir(mut self: Box<Self>) -> Result<(), StoreError> {
        let Some(stream) = self.stream.take() else {
            return Err(StoreError::new("closedir", &self.path, Errno::EBADF));
        };
        stream
            .close()
            .map_err(|e| StoreError::new("closedir", &self.path, e))?;
        debug!(path = %self.path.display(), "closedir");
        Ok(())
    }
}

impl Drop for PosixDirHandle {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            warn!(path = %self.path.display(), "directory stream dropped without closedir");
            if let Err(e) = stream.close() {
                warn!(path = %self.path.display(), error = %e, "closedir during drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, PosixStore, Store};

    #[test]
    fn enumerates_every_entry_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c"] {
            std::fs::write(dir.path().join(name), name).unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let store = PosixStore::new();
        let mut handle = store.opendir(dir.path()).unwrap();
        let mut names = Vec::new();
        while let Some(entry) = handle.read_next().unwrap() {
            if entry.name == "sub" {
                assert!(matches!(entry.file_type, FileType::Directory | FileType::Unknown));
            }
            names.push(entry.name);
        }
        // End of stream is sticky and never an error.
        assert!(handle.read_next().unwrap().is_none());
        handle.closedir().unwrap();

        names.sort();
        assert_eq!(names, vec![".", "..", "a", "b", "c", "sub"]);
    }

    #[test]
    fn entry_paths_join_origin() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("only"), b"").unwrap();
        let store = PosixStore::new();
        let mut handle = store.open_dir(dir.path()).unwrap();
        let mut found = None;
        while let Some(entry) = handle.read_next().unwrap() {
            if !entry.is_dot() {
                found = Some(entry);
            }
        }
        Box::new(handle).closedir().unwrap();
        let entry = found.unwrap();
        assert_eq!(entry.path, dir.path().join("only"));
        assert_ne!(entry.inode, 0);
    }

    #[test]
    fn non_utf8_names_keep_exact_paths() {
        let dir = tempfile::tempdir().unwrap();
        let raw = OsStr::from_bytes(b"bad\xffname");
        std::fs::write(dir.path().join(raw), b"x").unwrap();

        let store = PosixStore::new();
        let mut handle = store.opendir(dir.path()).unwrap();
        let mut found = None;
        while let Some(entry) = handle.read_next().unwrap() {
            if !entry.is_dot() {
                found = Some(entry);
            }
        }
        handle.closedir().unwrap();

        let entry = found.unwrap();
        assert_eq!(entry.path, dir.path().join(raw));
        assert_eq!(entry.path.file_name(), Some(raw));
        assert!(entry.name.starts_with("bad"));
        assert_eq!(store.stat(&entry.path).unwrap().size, 1);
    }

    #[test]
    fn opendir_on_file_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();
        let err = PosixStore::new().opendir(&file).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotADirectory);
        assert_eq!(err.code(), -libc::ENOTDIR);
    }

    #[test]
    fn opendir_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = PosixStore::new()
            .opendir(&dir.path().join("absent"))
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn dropped_stream_releases_slot() {
        let dir = tempfile::tempdir().unwrap();
        let store = PosixStore::new();
        let handle = store.open_dir(dir.path()).unwrap();
        assert_eq!(store.open_dirs(), 1);
        drop(handle);
        assert_eq!(store.open_dirs(), 0);
    }
}
