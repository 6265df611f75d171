//! Virtual path resolution.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use nestfs_core::{ArchiveLocation, FileStat, Filesystem, VfsError};

/// A path that exists on disk as-is.
#[derive(Debug, Clone)]
pub struct RealPath {
    pub path: PathBuf,
    /// Stat of the path itself; symlinks are not followed.
    pub stat: FileStat,
    /// Target of the path when it is a symlink.
    pub symlink_target: Option<PathBuf>,
}

/// Outcome of resolving a virtual path.
#[derive(Debug, Clone)]
pub enum Resolution {
    Real(RealPath),
    Archive(ArchiveLocation),
}

/// Decides whether a path is real, inside an archive, or nonexistent.
#[derive(Clone)]
pub struct PathResolver {
    fs: Arc<dyn Filesystem>,
    max_depth: usize,
}

impl PathResolver {
    /// Create a resolver that strips at most `max_depth` segments.
    pub fn new(fs: Arc<dyn Filesystem>, max_depth: usize) -> Self {
        Self { fs, max_depth }
    }

    /// Resolve a path.
    ///
    /// A path that exists is always [`Resolution::Real`], even when one of
    /// its ancestors is an archive file. Otherwise the resolver walks upward
    /// until the first existing ancestor: a regular file there is the archive,
    /// anything else means the path does not exist.
    pub fn resolve(&self, path: &Path) -> Result<Resolution, VfsError> {
        match self.fs.symlink_metadata(path) {
            Ok(stat) => {
                let symlink_target = if stat.is_symlink() {
                    self.fs.read_link(path).ok()
                } else {
                    None
                };
                return Ok(Resolution::Real(RealPath {
                    path: path.to_path_buf(),
                    stat,
                    symlink_target,
                }));
            }
            Err(err) if is_missing(&err) => {}
            Err(err) => return Err(VfsError::io(path, err)),
        }

        let mut current = path.to_path_buf();
        let mut internal = String::new();

        for _ in 0..self.max_depth {
            let Some(name) = current.file_name() else {
                return Err(VfsError::not_found(path));
            };
            let name = name.to_string_lossy();
            internal = if internal.is_empty() {
                name.into_owned()
            } else {
                format!("{name}/{internal}")
            };

            if !current.pop() {
                return Err(VfsError::not_found(path));
            }

            match self.fs.metadata(&current) {
                Ok(stat) if stat.is_file() => {
                    debug!(archive = %current.display(), internal = %internal, "resolved archive path");
                    return Ok(Resolution::Archive(ArchiveLocation::new(current, &internal)));
                }
                Ok(_) => return Err(VfsError::not_found(path)),
                Err(err) if is_missing(&err) => continue,
                Err(err) => return Err(VfsError::io(&current, err)),
            }
        }

        Err(VfsError::Exhausted {
            path: path.to_path_buf(),
            depth: self.max_depth,
        })
    }
}

impl std::fmt::Debug for PathResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathResolver")
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

fn is_missing(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}
