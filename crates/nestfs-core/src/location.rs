//! Locations that fall inside an archive file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Suffixes of tarballs wrapped in a stream compressor.
const COMPRESSED_TAR_SUFFIXES: &[&str] = &[
    ".tar.gz", ".tgz", ".tar.xz", ".txz", ".tar.bz2", ".tbz2", ".tbz",
];

/// A virtual path decomposed into the archive on disk and the path inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchiveLocation {
    /// The real, regular file on disk.
    pub archive_file_path: PathBuf,

    /// Slash-separated path inside the archive; empty means the archive root.
    pub internal_path: String,

    /// Whether listing must go through a decompress-then-list-as-tar pipeline.
    pub is_compressed_tar_pipeline: bool,
}

impl ArchiveLocation {
    /// Create a location, normalizing the internal path.
    pub fn new(archive_file_path: impl Into<PathBuf>, internal_path: &str) -> Self {
        let archive_file_path = archive_file_path.into();
        let is_compressed_tar_pipeline = is_compressed_tar(&archive_file_path);

        Self {
            archive_file_path,
            internal_path: normalize_internal_path(internal_path),
            is_compressed_tar_pipeline,
        }
    }

    /// Check if this location is the archive root.
    pub fn is_root(&self) -> bool {
        self.internal_path.is_empty()
    }

    /// The virtual path this location was resolved from.
    pub fn virtual_path(&self) -> PathBuf {
        if self.is_root() {
            self.archive_file_path.clone()
        } else {
            self.archive_file_path.join(&self.internal_path)
        }
    }
}

/// Check if a file name denotes a gzip/xz/bzip2-compressed tarball.
pub fn is_compressed_tar(path: &Path) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.to_string_lossy().to_lowercase();
    COMPRESSED_TAR_SUFFIXES
        .iter()
        .any(|suffix| name.ends_with(suffix))
}

/// Normalize a path found inside an archive.
///
/// Backslashes become slashes, `.` segments and empty segments are dropped,
/// so `./dir\\sub/` and `dir/sub` compare equal.
pub fn normalize_internal_path(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}
