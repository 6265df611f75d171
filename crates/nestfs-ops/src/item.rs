//! Transfer items and the self-drop guard.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Whether a batch copies or moves its sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferMode {
    Copy,
    Move,
}

impl std::fmt::Display for TransferMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "Copy"),
            Self::Move => write!(f, "Move"),
        }
    }
}

/// One source and the exact path it should end up at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl TransferItem {
    /// Create a new transfer item.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// Create an item placing `source` inside `directory` under its own name.
    pub fn into_directory(source: impl Into<PathBuf>, directory: &Path) -> Self {
        let source = source.into();
        let destination = match source.file_name() {
            Some(name) => directory.join(name),
            None => directory.to_path_buf(),
        };
        Self {
            source,
            destination,
        }
    }

    /// Check if executing this item would be a no-op or recurse into itself.
    ///
    /// True when destination and source are the same path, when the
    /// destination is the source's own parent directory, or when the
    /// destination lies inside the source.
    pub fn is_self_drop(&self) -> bool {
        let source = normalize_lexically(&self.source);
        let destination = normalize_lexically(&self.destination);

        destination.starts_with(&source) || source.parent() == Some(destination.as_path())
    }
}

/// Drop items that must never reach the engine.
///
/// The engine performs no cycle detection; callers run their batch through
/// this before submitting it.
pub fn filter_self_drops(items: Vec<TransferItem>) -> Vec<TransferItem> {
    items
        .into_iter()
        .filter(|item| {
            let keep = !item.is_self_drop();
            if !keep {
                tracing::debug!(
                    source = %item.source.display(),
                    destination = %item.destination.display(),
                    "dropping self-referential transfer item"
                );
            }
            keep
        })
        .collect()
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_path_is_self_drop() {
        let item = TransferItem::new("/data/a.txt", "/data/./a.txt");
        assert!(item.is_self_drop());
    }

    #[test]
    fn test_destination_is_source_parent() {
        let item = TransferItem::new("/data/photos", "/data");
        assert!(item.is_self_drop());
    }

    #[test]
    fn test_destination_inside_source() {
        let item = TransferItem::new("/data/photos", "/data/photos/2024/photos");
        assert!(item.is_self_drop());
    }

    #[test]
    fn test_sibling_with_common_prefix_is_kept() {
        let item = TransferItem::new("/data/photos", "/data/photos-backup/photos");
        assert!(!item.is_self_drop());
    }

    #[test]
    fn test_filter_self_drops() {
        let items = vec![
            TransferItem::new("/a/x", "/a/x"),
            TransferItem::new("/a/x", "/b/x"),
            TransferItem::new("/a/dir", "/a/dir/sub/dir"),
            TransferItem::new("/a/y", "/a/../b/y"),
        ];
        let kept = filter_self_drops(items);
        assert_eq!(
            kept,
            vec![
                TransferItem::new("/a/x", "/b/x"),
                TransferItem::new("/a/y", "/a/../b/y"),
            ]
        );
    }

    #[test]
    fn test_into_directory() {
        let item = TransferItem::into_directory("/src/report.pdf", Path::new("/dst"));
        assert_eq!(item.destination, PathBuf::from("/dst/report.pdf"));
    }
}
