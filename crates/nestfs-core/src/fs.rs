//! Real-filesystem access layer.
//!
//! Every component reaches the disk through [`Filesystem`], so test doubles
//! can observe or restrict what the engine does.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Type of an on-disk object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    /// Sockets, devices, fifos.
    Other,
}

/// The subset of stat results the engine relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub kind: FileKind,
    pub len: u64,
    pub modified: Option<SystemTime>,
    pub created: Option<SystemTime>,
}

impl FileStat {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    /// Check if this is a symlink.
    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }
}

impl From<&fs::Metadata> for FileStat {
    fn from(metadata: &fs::Metadata) -> Self {
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        };

        Self {
            kind,
            len: metadata.len(),
            modified: metadata.modified().ok(),
            created: metadata.created().ok(),
        }
    }
}

/// Filesystem operations consumed by the engine.
pub trait Filesystem: Send + Sync {
    /// Stat without following a final symlink.
    fn symlink_metadata(&self, path: &Path) -> io::Result<FileStat>;

    /// Stat following symlinks.
    fn metadata(&self, path: &Path) -> io::Result<FileStat>;

    /// Names of the children of a directory, in enumeration order.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>>;

    /// Read a symlink's target without following it.
    fn read_link(&self, path: &Path) -> io::Result<PathBuf>;

    /// Copy a regular file, returning the number of bytes copied.
    ///
    /// Fails with `InvalidInput` for FIFOs, sockets and devices.
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64>;

    /// Recreate a symlink at `to` pointing where `from` points.
    fn copy_symlink(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Atomic rename; fails across devices.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// [`Filesystem`] backed by `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for LocalFs {
    fn symlink_metadata(&self, path: &Path) -> io::Result<FileStat> {
        fs::symlink_metadata(path).map(|m| FileStat::from(&m))
    }

    fn metadata(&self, path: &Path) -> io::Result<FileStat> {
        fs::metadata(path).map(|m| FileStat::from(&m))
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>> {
        Ok(fs::read_dir(path)?
            .flatten()
            .map(|entry| entry.file_name())
            .collect())
    }

    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        fs::read_link(path)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        // fs::copy blocks forever reading a FIFO with no writer.
        if !fs::metadata(from)?.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            ));
        }
        fs::copy(from, to)
    }

    #[cfg(unix)]
    fn copy_symlink(&self, from: &Path, to: &Path) -> io::Result<()> {
        let target = fs::read_link(from)?;
        std::os::unix::fs::symlink(target, to)
    }

    #[cfg(not(unix))]
    fn copy_symlink(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::copy(from, to).map(|_| ())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_fs_stat_kinds() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hello").unwrap();

        let fs = LocalFs::new();
        let stat = fs.symlink_metadata(&file).unwrap();
        assert!(stat.is_file());
        assert_eq!(stat.len, 5);
        assert!(stat.modified.is_some());

        assert!(fs.metadata(dir.path()).unwrap().is_dir());
    }

    #[test]
    fn test_local_fs_read_dir_names() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("one"), b"1").unwrap();
        fs::create_dir(dir.path().join("two")).unwrap();

        let mut names = LocalFs.read_dir(dir.path()).unwrap();
        names.sort();
        assert_eq!(names, vec![OsString::from("one"), OsString::from("two")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_local_fs_symlink_not_followed() {
        let dir = TempDir::new().unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink("missing-target", &link).unwrap();

        let stat = LocalFs.symlink_metadata(&link).unwrap();
        assert!(stat.is_symlink());
        assert_eq!(LocalFs.read_link(&link).unwrap(), PathBuf::from("missing-target"));
    }

    #[cfg(unix)]
    #[test]
    fn test_local_fs_copy_rejects_fifo() {
        let dir = TempDir::new().unwrap();
        let fifo = dir.path().join("pipe");
        let status = std::process::Command::new("mkfifo").arg(&fifo).status().unwrap();
        assert!(status.success());

        assert_eq!(LocalFs.symlink_metadata(&fifo).unwrap().kind, FileKind::Other);
        let err = LocalFs.copy_file(&fifo, &dir.path().join("copy")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(!dir.path().join("copy").exists());
    }
}
