//! Archive content enumeration.
//!
//! Backends produce a flat table of [`ArchiveRecord`]s for a whole archive;
//! [`children_of`] folds that table into the immediate children of one
//! internal directory.

mod builtin;
mod seven_zip;

use std::sync::Arc;
use std::time::SystemTime;

use indexmap::IndexMap;
use tracing::debug;

use nestfs_core::{
    normalize_internal_path, ArchiveBackendKind, ArchiveLocation, DirectoryEntry, EngineConfig,
    EntryKind, VfsError,
};

pub use builtin::BuiltinArchives;
pub use seven_zip::{parse_technical_listing, SevenZip};

/// One row of an archive's entry table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    /// Path inside the archive as reported by the lister.
    pub path: String,
    /// Raw attribute string (`D....`, `drwxr-xr-x`, ...).
    pub attributes: String,
    /// Explicit folder flag, when the lister reports one.
    pub is_folder: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl ArchiveRecord {
    /// Whether the row itself marks a directory.
    pub fn is_dir(&self) -> bool {
        self.is_folder
            || self.attributes.starts_with('D')
            || self.attributes.starts_with('d')
    }
}

/// Source of archive entry tables.
pub trait ArchiveBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// List every entry of the archive at `location`.
    fn records(&self, location: &ArchiveLocation) -> Result<Vec<ArchiveRecord>, VfsError>;
}

/// Pick the archive backend the config asks for.
pub fn archive_backend(config: &EngineConfig) -> Arc<dyn ArchiveBackend> {
    let external = SevenZip::new(&config.archive_tool);
    match config.archive_backend {
        ArchiveBackendKind::External => Arc::new(external),
        ArchiveBackendKind::Builtin => Arc::new(BuiltinArchives::new(&config.archive_tool)),
        ArchiveBackendKind::Auto => {
            if external.is_installed() {
                Arc::new(external)
            } else {
                debug!(tool = %config.archive_tool, "archive tool not on PATH, using builtin reader");
                Arc::new(BuiltinArchives::new(&config.archive_tool))
            }
        }
    }
}

/// Immediate children of `location` within an archive's entry table.
///
/// Rows are considered in table order. A name seen first keeps its slot;
/// a later row that implies the name is a directory (because something lives
/// below it) upgrades the existing entry to a directory instead of adding a
/// duplicate. Directories get size 0 and rows that only imply a directory
/// carry no timestamp.
pub fn children_of(records: &[ArchiveRecord], location: &ArchiveLocation) -> Vec<DirectoryEntry> {
    let base = location.virtual_path();
    let prefix = if location.is_root() {
        String::new()
    } else {
        format!("{}/", location.internal_path)
    };

    let mut children: IndexMap<String, DirectoryEntry> = IndexMap::new();

    for record in records {
        let path = normalize_internal_path(&record.path);
        let Some(relative) = path.strip_prefix(prefix.as_str()) else {
            continue;
        };
        if relative.is_empty() {
            continue;
        }

        let (name, nested) = match relative.split_once('/') {
            Some((name, _)) => (name, true),
            None => (relative, false),
        };
        let is_dir = nested || record.is_dir();

        if let Some(existing) = children.get_mut(name) {
            if is_dir && !existing.is_dir() {
                existing.kind = EntryKind::Directory;
                existing.size = 0;
                existing.extension = Default::default();
            }
            continue;
        }

        let kind = if is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let mut entry = DirectoryEntry::new(name, base.join(name), kind);
        if !nested {
            entry = entry.with_modified(record.modified);
            if !is_dir {
                entry = entry.with_size(record.size);
            }
        }
        children.insert(name.to_string(), entry);
    }

    children.into_values().collect()
}

/// Whether `location` names something inside the table: the root, an
/// explicit row, or a prefix of some row.
pub(crate) fn location_exists(records: &[ArchiveRecord], location: &ArchiveLocation) -> bool {
    if location.is_root() {
        return true;
    }
    let prefix = format!("{}/", location.internal_path);
    records.iter().any(|record| {
        let path = normalize_internal_path(&record.path);
        path == location.internal_path || path.starts_with(&prefix)
    })
}

/// Total size of the file rows strictly below `location`.
pub fn total_file_size(records: &[ArchiveRecord], location: &ArchiveLocation) -> u64 {
    let prefix = if location.is_root() {
        String::new()
    } else {
        format!("{}/", location.internal_path)
    };
    records
        .iter()
        .filter(|record| !record.is_dir())
        .filter(|record| {
            let path = normalize_internal_path(&record.path);
            path.len() > prefix.len() && path.starts_with(&prefix)
        })
        .map(|record| record.size)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(path: &str, size: u64) -> ArchiveRecord {
        ArchiveRecord {
            path: path.to_string(),
            attributes: "....A".to_string(),
            is_folder: false,
            size,
            modified: Some(SystemTime::UNIX_EPOCH),
        }
    }

    fn dir(path: &str) -> ArchiveRecord {
        ArchiveRecord {
            path: path.to_string(),
            attributes: "D....".to_string(),
            is_folder: true,
            size: 0,
            modified: None,
        }
    }

    #[test]
    fn test_children_of_subdirectory() {
        let records = vec![file("subdir/a.txt", 3), file("subdir/nested/b.txt", 7)];
        let loc = ArchiveLocation::new("/archive.zip", "subdir");

        let children = children_of(&records, &loc);
        assert_eq!(children.len(), 2);
        assert_eq!(children[0].name, "a.txt");
        assert_eq!(children[0].kind, EntryKind::File);
        assert_eq!(children[0].size, 3);
        assert_eq!(children[0].path, PathBuf::from("/archive.zip/subdir/a.txt"));
        assert_eq!(children[1].name, "nested");
        assert_eq!(children[1].kind, EntryKind::Directory);
        assert_eq!(children[1].size, 0);
        assert!(children[1].modified.is_none());
    }

    #[test]
    fn test_explicit_and_implied_directory_collapse() {
        let records = vec![dir("docs/"), file("docs/readme.md", 10), file("top.txt", 1)];
        let loc = ArchiveLocation::new("/a.zip", "");

        let children = children_of(&records, &loc);
        let names: Vec<_> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "top.txt"]);
        assert!(children[0].is_dir());
    }

    #[test]
    fn test_implied_directory_upgrades_earlier_file_row() {
        let records = vec![file("x", 4), file("x/y", 1)];
        let loc = ArchiveLocation::new("/a.zip", "");

        let children = children_of(&records, &loc);
        assert_eq!(children.len(), 1);
        assert!(children[0].is_dir());
        assert_eq!(children[0].size, 0);
    }

    #[test]
    fn test_sibling_prefix_is_not_descendant() {
        let records = vec![file("sub/a", 1), file("subway/b", 1), file("sub", 0)];
        let loc = ArchiveLocation::new("/a.zip", "sub");

        let children = children_of(&records, &loc);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "a");
    }

    #[test]
    fn test_backslash_paths_normalized() {
        let records = vec![file("win\\dir\\f.txt", 2)];
        let loc = ArchiveLocation::new("/a.zip", "win");

        let children = children_of(&records, &loc);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "dir");
        assert!(children[0].is_dir());
    }

    #[test]
    fn test_location_exists_and_total_size() {
        let records = vec![file("a/b/c.bin", 100), file("a/d.bin", 20), dir("e/")];
        assert!(location_exists(&records, &ArchiveLocation::new("/x.zip", "a/b")));
        assert!(location_exists(&records, &ArchiveLocation::new("/x.zip", "e")));
        assert!(!location_exists(&records, &ArchiveLocation::new("/x.zip", "zzz")));

        assert_eq!(total_file_size(&records, &ArchiveLocation::new("/x.zip", "a")), 120);
        assert_eq!(total_file_size(&records, &ArchiveLocation::new("/x.zip", "")), 120);
        assert_eq!(total_file_size(&records, &ArchiveLocation::new("/x.zip", "a/b")), 100);
    }
}
