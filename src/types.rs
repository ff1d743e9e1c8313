//! Core types passed across the store contract.
//!
//! Flag sets wrap the platform's raw values and retain unknown bits, so a
//! backend receives exactly what the caller asked for.

use std::path::PathBuf;
use std::time::SystemTime;

use bitflags::bitflags;

/// Type of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FileType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Block device.
    BlockDevice,
    /// Character device.
    CharDevice,
    /// Named pipe.
    Fifo,
    /// Unix domain socket.
    Socket,
    /// The backend could not tell.
    Unknown,
}

impl FileType {
    /// Decode the `S_IFMT` bits of a mode.
    pub fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFREG as u32 => FileType::File,
            m if m == libc::S_IFDIR as u32 => FileType::Directory,
            m if m == libc::S_IFLNK as u32 => FileType::Symlink,
            m if m == libc::S_IFBLK as u32 => FileType::BlockDevice,
            m if m == libc::S_IFCHR as u32 => FileType::CharDevice,
            m if m == libc::S_IFIFO as u32 => FileType::Fifo,
            m if m == libc::S_IFSOCK as u32 => FileType::Socket,
            _ => FileType::Unknown,
        }
    }
}

/// Metadata for a filesystem entry (the `stat` equivalent).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Metadata {
    /// Type of the entry.
    pub file_type: FileType,
    /// Size in bytes.
    pub size: u64,
    /// Permission bits.
    pub permissions: Permissions,
    /// Inode number.
    pub inode: u64,
    /// Number of hard links.
    pub nlink: u64,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Device containing the entry.
    pub dev: u64,
    /// Device id, for special files.
    pub rdev: u64,
    /// Preferred I/O block size.
    pub block_size: u64,
    /// Number of 512-byte blocks allocated.
    pub blocks: u64,
    /// Last access time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub accessed: SystemTime,
    /// Last modification time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub modified: SystemTime,
    /// Last status change time.
    #[cfg_attr(feature = "serde", serde(with = "system_time_serde"))]
    pub changed: SystemTime,
}

impl Metadata {
    /// Returns `true` if this is a regular file.
    #[inline]
    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    /// Returns `true` if this is a directory.
    #[inline]
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// Returns `true` if this is a symbolic link.
    #[inline]
    pub fn is_symlink(&self) -> bool {
        self.file_type == FileType::Symlink
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            file_type: FileType::File,
            size: 0,
            permissions: Permissions::default_file(),
            inode: 0,
            nlink: 1,
            uid: 0,
            gid: 0,
            dev: 0,
            rdev: 0,
            block_size: 0,
            blocks: 0,
            accessed: SystemTime::UNIX_EPOCH,
            modified: SystemTime::UNIX_EPOCH,
            changed: SystemTime::UNIX_EPOCH,
        }
    }
}

/// A directory entry produced by [`DirHandle::read_next`](crate::DirHandle::read_next).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DirEntry {
    /// Name of the entry (filename only), lossily decoded for display.
    pub name: String,
    /// The directory's origin path joined with the entry's exact name bytes.
    pub path: PathBuf,
    /// Type of the entry, [`FileType::Unknown`] if the stream does not say.
    pub file_type: FileType,
    /// Inode number.
    pub inode: u64,
}

impl DirEntry {
    /// `true` for the `.` and `..` entries.
    pub fn is_dot(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

/// Unix-style permissions stored as a mode bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Permissions(u32);

impl Permissions {
    /// Create permissions from a Unix mode (e.g., 0o755).
    #[inline]
    pub const fn from_mode(mode: u32) -> Self {
        Self(mode & 0o7777)
    }

    /// Get the raw mode value.
    #[inline]
    pub const fn mode(&self) -> u32 {
        self.0
    }

    /// Returns `true` if these permissions deny writing.
    #[inline]
    pub const fn readonly(&self) -> bool {
        (self.0 & 0o222) == 0
    }

    /// Default permissions for a new file (0o644 = rw-r--r--).
    #[inline]
    pub const fn default_file() -> Self {
        Self(0o644)
    }

    /// Default permissions for a new directory (0o755 = rwxr-xr-x).
    #[inline]
    pub const fn default_dir() -> Self {
        Self(0o755)
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::default_file()
    }
}

/// Filesystem statistics (the `statvfs` equivalent).
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatFs {
    /// Filesystem block size.
    pub block_size: u64,
    /// Fragment size; block counts are in these units.
    pub fragment_size: u64,
    /// Total size in bytes.
    pub total_bytes: u64,
    /// Free bytes.
    pub free_bytes: u64,
    /// Bytes available to unprivileged users.
    pub available_bytes: u64,
    /// Total number of inodes.
    pub total_inodes: u64,
    /// Free inodes.
    pub free_inodes: u64,
    /// Inodes available to unprivileged users.
    pub available_inodes: u64,
    /// Maximum filename length.
    pub max_name_len: u64,
}

/// Access and modification times for [`Store::utime`](crate::Store::utime).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTimes {
    /// New access time.
    pub accessed: SystemTime,
    /// New modification time.
    pub modified: SystemTime,
}

/// New owner for `chown`/`lchown`. `None` leaves that id unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ownership {
    /// User id.
    pub uid: Option<u32>,
    /// Group id.
    pub gid: Option<u32>,
}

/// Origin for [`Handle::lseek`](crate::Handle::lseek).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Whence {
    /// From the start of the resource.
    Set,
    /// From the current position.
    Current,
    /// From the end of the resource.
    End,
}

impl Whence {
    pub(crate) fn as_raw(self) -> libc::c_int {
        match self {
            Whence::Set => libc::SEEK_SET,
            Whence::Current => libc::SEEK_CUR,
            Whence::End => libc::SEEK_END,
        }
    }
}

bitflags! {
    /// Access and creation flags for [`Store::open`](crate::Store::open).
    ///
    /// The empty set is read-only access.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: libc::c_int {
        /// Write-only access.
        const WRITE_ONLY = libc::O_WRONLY;
        /// Read and write access.
        const READ_WRITE = libc::O_RDWR;
        /// Create the file if it does not exist.
        const CREATE = libc::O_CREAT;
        /// With `CREATE`, fail if the file exists.
        const EXCLUSIVE = libc::O_EXCL;
        /// Truncate to zero length.
        const TRUNCATE = libc::O_TRUNC;
        /// Writes go to the end of the file.
        const APPEND = libc::O_APPEND;
        /// Non-blocking I/O.
        const NONBLOCK = libc::O_NONBLOCK;
        /// Fail unless the path is a directory.
        const DIRECTORY = libc::O_DIRECTORY;
        /// Fail if the final component is a symlink.
        const NOFOLLOW = libc::O_NOFOLLOW;
        /// Close on exec.
        const CLOEXEC = libc::O_CLOEXEC;
        /// Synchronous writes.
        const SYNC = libc::O_SYNC;

        const _ = !0;
    }
}

impl OpenFlags {
    /// Read-only access.
    pub const READ: Self = Self::empty();

    /// Write access with create and truncate.
    pub const WRITE: Self = Self::WRITE_ONLY.union(Self::CREATE).union(Self::TRUNCATE);

    /// Append mode, creating the file if needed.
    pub const APPEND_CREATE: Self = Self::WRITE_ONLY.union(Self::CREATE).union(Self::APPEND);
}

bitflags! {
    /// Checks performed by [`Store::access`](crate::Store::access).
    ///
    /// The empty set only tests for existence.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMode: libc::c_int {
        /// Readable.
        const READ = libc::R_OK;
        /// Writable.
        const WRITE = libc::W_OK;
        /// Executable / searchable.
        const EXECUTE = libc::X_OK;

        const _ = !0;
    }
}

impl AccessMode {
    /// Existence check only.
    pub const EXISTS: Self = Self::empty();
}

bitflags! {
    /// Memory protection for [`Handle::mmap`](crate::Handle::mmap).
    ///
    /// The empty set is `PROT_NONE`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Protection: libc::c_int {
        /// Pages may be read.
        const READ = libc::PROT_READ;
        /// Pages may be written.
        const WRITE = libc::PROT_WRITE;
        /// Pages may be executed.
        const EXEC = libc::PROT_EXEC;

        const _ = !0;
    }
}

bitflags! {
    /// Mapping flags for [`Handle::mmap`](crate::Handle::mmap).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MapFlags: libc::c_int {
        /// Updates are visible to other mappings and carried to the file.
        const SHARED = libc::MAP_SHARED;
        /// Copy-on-write mapping.
        const PRIVATE = libc::MAP_PRIVATE;
        /// Place the mapping exactly at the address hint.
        const FIXED = libc::MAP_FIXED;

        const _ = !0;
    }
}

/// Serde support for SystemTime (when serde feature is enabled).
#[cfg(feature = "serde")]
mod system_time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Nanoseconds always count forward from `secs`.
        let (secs, nanos) = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => (after.as_secs() as i64, after.subsec_nanos()),
            Err(before) => {
                let before = before.duration();
                match before.subsec_nanos() {
                    0 => (-(before.as_secs() as i64), 0),
                    n => (-(before.as_secs() as i64) - 1, 1_000_000_000 - n),
                }
            }
        };
        (secs, nanos).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (secs, nanos): (i64, u32) = Deserialize::deserialize(deserializer)?;
        let nanos = Duration::from_nanos(u64::from(nanos));
        Ok(if secs >= 0 {
            UNIX_EPOCH + Duration::from_secs(secs as u64) + nanos
        } else {
            UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_from_mode() {
        assert_eq!(FileType::from_mode(0o100644), FileType::File);
        assert_eq!(FileType::from_mode(0o040755), FileType::Directory);
        assert_eq!(FileType::from_mode(0o120777), FileType::Symlink);
        assert_eq!(FileType::from_mode(0o010600), FileType::Fifo);
        assert_eq!(FileType::from_mode(0), FileType::Unknown);
    }

    #[test]
    fn metadata_predicates() {
        let m = Metadata {
            file_type: FileType::Directory,
            ..Default::default()
        };
        assert!(m.is_dir());
        assert!(!m.is_file());
        assert!(!m.is_symlink());
    }

    #[test]
    fn permissions_from_mode_masks_type_bits() {
        let p = Permissions::from_mode(0o100755);
        assert_eq!(p.mode(), 0o755);
        assert!(!p.readonly());
        assert!(Permissions::from_mode(0o444).readonly());
    }

    #[test]
    fn open_flags_map_to_platform_values() {
        assert_eq!(OpenFlags::READ.bits(), libc::O_RDONLY);
        assert_eq!(
            OpenFlags::WRITE.bits(),
            libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC
        );
        assert!(OpenFlags::APPEND_CREATE.contains(OpenFlags::APPEND));
    }

    #[test]
    fn open_flags_retain_unknown_bits() {
        let raw = libc::O_RDWR | 0x4000_0000;
        assert_eq!(OpenFlags::from_bits_retain(raw).bits(), raw);
    }

    #[test]
    fn whence_maps_to_seek_constants() {
        assert_eq!(Whence::Set.as_raw(), libc::SEEK_SET);
        assert_eq!(Whence::Current.as_raw(), libc::SEEK_CUR);
        assert_eq!(Whence::End.as_raw(), libc::SEEK_END);
    }

    #[test]
    fn dot_entries() {
        let entry = DirEntry {
            name: "..".into(),
            path: PathBuf::from("/tmp/.."),
            file_type: FileType::Directory,
            inode: 2,
        };
        assert!(entry.is_dot());
    }

    #[test]
    fn types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FileType>();
        assert_send_sync::<Metadata>();
        assert_send_sync::<DirEntry>();
        assert_send_sync::<Permissions>();
        assert_send_sync::<StatFs>();
        assert_send_sync::<OpenFlags>();
        assert_send_sync::<MapFlags>();
    }

    #[cfg(feature = "serde")]
    #[test]
    fn metadata_times_survive_serde_on_both_sides_of_epoch() {
        use std::time::{Duration, UNIX_EPOCH};

        let m = Metadata {
            accessed: UNIX_EPOCH - Duration::new(86_400, 250_000_000),
            modified: UNIX_EPOCH - Duration::from_secs(1),
            changed: UNIX_EPOCH + Duration::new(1_700_000_000, 5),
            ..Default::default()
        };
        let json = serde_json::to_string(&m).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.accessed, m.accessed);
        assert_eq!(back.modified, m.modified);
        assert_eq!(back.changed, m.changed);
    }
}
