//! Directory streams.

use std::path::Path;

use tracing::warn;

use crate::{DirEntry, StoreError};

/// An open directory stream.
///
/// Iteration advances monotonically; there is no rewind. End of stream is
/// `Ok(None)` and is never reported as an error.
///
/// # Thread Safety
///
/// Directory handles are `Send`; iteration takes `&mut self`.
pub trait DirHandle: Send {
    /// The path this stream was opened from. Diagnostic only.
    fn path(&self) -> &Path;

    /// Advance the stream.
    ///
    /// - `Ok(Some(entry))`: the next entry
    /// - `Ok(None)`: end of stream
    /// - `Err(_)`: the stream could not be read
    fn read_next(&mut self) -> Result<Option<DirEntry>, StoreError>;

    /// Release the stream.
    fn closedir(self: Box<Self>) -> Result<(), StoreError>;
}

/// Iterator over a directory stream.
///
/// Yields each entry as `Ok`, then closes the stream when it reaches the
/// end; a failure to close is yielded as the final item. A read error is
/// yielded once and ends the iteration.
///
/// # Example
///
/// ```rust
/// use iostore::{PosixStore, ReadDirIter, Store, StoreError};
///
/// fn names(store: &PosixStore, dir: &std::path::Path) -> Result<Vec<String>, StoreError> {
///     ReadDirIter::new(store.opendir(dir)?)
///         .filter(|e| !matches!(e, Ok(entry) if entry.is_dot()))
///         .map(|e| e.map(|entry| entry.name))
///         .collect()
/// }
///
/// let dir = tempfile::tempdir().unwrap();
/// std::fs::write(dir.path().join("a"), b"").unwrap();
/// assert_eq!(names(&PosixStore::new(), dir.path()).unwrap(), vec!["a"]);
/// ```
pub struct ReadDirIter {
    dir: Option<Box<dyn DirHandle>>,
}

impl ReadDirIter {
    /// Iterate over an open stream.
    pub fn new(dir: Box<dyn DirHandle>) -> Self {
        Self { dir: Some(dir) }
    }

    /// Collect all entries, short-circuiting on first error.
    pub fn collect_all(self) -> Result<Vec<DirEntry>, StoreError> {
        self.collect()
    }
}

impl Iterator for ReadDirIter {
    type Item = Result<DirEntry, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let dir = self.dir.as_mut()?;
        match dir.read_next() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                let dir = self.dir.take()?;
                dir.closedir().err().map(Err)
            }
            Err(e) => {
                if let Some(dir) = self.dir.take() {
                    if let Err(close) = dir.closedir() {
                        warn!(error = %close, "closedir after read failure");
                    }
                }
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, FileType};
    use nix::errno::Errno;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed script of results.
    struct Scripted {
        items: Vec<Result<Option<DirEntry>, StoreError>>,
        closes: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(items: Vec<Result<Option<DirEntry>, StoreError>>) -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            let mut items = items;
            items.reverse();
            (
                Self {
                    items,
                    closes: Arc::clone(&closes),
                },
                closes,
            )
        }
    }

    impl DirHandle for Scripted {
        fn path(&self) -> &Path {
            Path::new("/scripted")
        }

        fn read_next(&mut self) -> Result<Option<DirEntry>, StoreError> {
            self.items.pop().unwrap_or(Ok(None))
        }

        fn closedir(self: Box<Self>) -> Result<(), StoreError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn entry(name: &str) -> DirEntry {
        DirEntry {
            name: name.into(),
            path: PathBuf::from("/scripted").join(name),
            file_type: FileType::File,
            inode: 1,
        }
    }

    #[test]
    fn yields_entries_then_closes() {
        let (dir, closes) = Scripted::new(vec![Ok(Some(entry("a"))), Ok(Some(entry("b")))]);
        let names: Vec<_> = ReadDirIter::new(Box::new(dir))
            .map(|e| e.unwrap().name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn read_error_is_yielded_once() {
        let (dir, closes) = Scripted::new(vec![
            Ok(Some(entry("a"))),
            Err(StoreError::new("readdir", "/scripted", Errno::EIO)),
            Ok(Some(entry("never"))),
        ]);
        let mut iter = ReadDirIter::new(Box::new(dir));
        assert!(iter.next().unwrap().is_ok());
        let err = iter.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(iter.next().is_none());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn collect_all_short_circuits() {
        let (dir, _) = Scripted::new(vec![Err(StoreError::new("readdir", "/s", Errno::EACCES))]);
        assert!(ReadDirIter::new(Box::new(dir)).collect_all().is_err());
    }

    #[test]
    fn read_dir_iter_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ReadDirIter>();
    }
}
