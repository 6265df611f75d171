//! Directory entry types.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Kind of a listed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
}

impl EntryKind {
    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory)
    }

    /// Check if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, Self::File)
    }

    /// Check if this is a symlink.
    pub fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink)
    }
}

/// One listed item, real or synthesized from an archive record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// File/directory name (no separators).
    pub name: CompactString,

    /// Absolute, fully resolved path (virtual for archive members).
    pub path: PathBuf,

    /// Entry type.
    pub kind: EntryKind,

    /// Link target as read, never followed.
    pub symlink_target: Option<CompactString>,

    /// Size in bytes; 0 for directories unless precomputed.
    pub size: u64,

    /// Last modification time.
    pub modified: Option<SystemTime>,

    /// Creation time (absent for archive members).
    pub created: Option<SystemTime>,

    /// Lowercase extension without the dot, empty when there is none.
    pub extension: CompactString,
}

impl DirectoryEntry {
    /// Create an entry with empty metadata.
    pub fn new(name: impl Into<CompactString>, path: impl Into<PathBuf>, kind: EntryKind) -> Self {
        let name = name.into();
        let extension = if kind.is_dir() {
            CompactString::default()
        } else {
            extension_of(&name)
        };

        Self {
            name,
            path: path.into(),
            kind,
            symlink_target: None,
            size: 0,
            modified: None,
            created: None,
            extension,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    pub fn with_created(mut self, created: Option<SystemTime>) -> Self {
        self.created = created;
        self
    }

    pub fn with_symlink_target(mut self, target: impl Into<CompactString>) -> Self {
        self.symlink_target = Some(target.into());
        self
    }

    /// Check if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Lowercase extension of a file name, without the dot.
///
/// Dotfiles such as `.bashrc` have no extension.
pub fn extension_of(name: &str) -> CompactString {
    Path::new(name)
        .extension()
        .map(|ext| CompactString::from(ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Sort entries directories-first, then case-insensitively by name.
///
/// Names that differ only by case fall back to a byte comparison so the
/// order is total and listings are reproducible.
pub fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by(|a, b| match (a.is_dir(), b.is_dir()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
    });
}
