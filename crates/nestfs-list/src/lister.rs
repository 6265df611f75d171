//! Unified directory listing over real directories and archives.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use compact_str::CompactString;
use tracing::{debug, warn};

use nestfs_core::{
    sort_entries, ArchiveLocation, DirectoryEntry, EngineConfig, EntryKind, FileKind, Filesystem,
    LocalFs, VfsError,
};

use crate::archive::{self, archive_backend, ArchiveBackend, ArchiveRecord};
use crate::resolve::{PathResolver, Resolution};

/// Where a listing's entries came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListingSource {
    Directory,
    Archive,
}

/// Entries of one virtual directory.
#[derive(Debug, Clone)]
pub struct Listing {
    /// The path that was listed.
    pub path: PathBuf,
    /// Children, directories first, then case-insensitive by name.
    pub entries: Vec<DirectoryEntry>,
    /// Whether the entries were read from inside an archive.
    pub in_archive: bool,
}

/// Lists real directories and archive interiors through one entry point.
#[derive(Clone)]
pub struct Lister {
    fs: Arc<dyn Filesystem>,
    resolver: PathResolver,
    archives: Arc<dyn ArchiveBackend>,
}

impl Lister {
    /// Create a lister from its collaborators.
    pub fn new(
        fs: Arc<dyn Filesystem>,
        archives: Arc<dyn ArchiveBackend>,
        config: &EngineConfig,
    ) -> Self {
        let resolver = PathResolver::new(Arc::clone(&fs), config.max_resolve_depth);
        Self {
            fs,
            resolver,
            archives,
        }
    }

    /// Create a lister over the local filesystem with the configured backend.
    pub fn local(config: &EngineConfig) -> Self {
        Self::new(Arc::new(LocalFs), archive_backend(config), config)
    }

    /// The filesystem layer this lister reads through.
    pub fn filesystem(&self) -> &Arc<dyn Filesystem> {
        &self.fs
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// List a virtual directory.
    ///
    /// Real directories are enumerated directly. A real regular file is
    /// listed as the root of the archive it contains, and any path below such
    /// a file is listed from the archive's entry table.
    pub fn list(&self, path: &Path) -> Result<Listing, VfsError> {
        let (source, entries) = match self.resolver.resolve(path)? {
            Resolution::Real(real) => {
                let target = if real.stat.is_symlink() {
                    self.fs
                        .metadata(&real.path)
                        .map_err(|e| VfsError::io(&real.path, e))?
                } else {
                    real.stat
                };
                match target.kind {
                    FileKind::Directory => (ListingSource::Directory, self.list_real(&real.path)?),
                    FileKind::File => {
                        let location = ArchiveLocation::new(&real.path, "");
                        (ListingSource::Archive, self.list_archive(&location)?)
                    }
                    _ => {
                        return Err(VfsError::io(
                            &real.path,
                            io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
                        ));
                    }
                }
            }
            Resolution::Archive(location) => (ListingSource::Archive, self.list_archive(&location)?),
        };

        debug!(path = %path.display(), count = entries.len(), ?source, "listed");

        Ok(Listing {
            path: path.to_path_buf(),
            entries,
            in_archive: source == ListingSource::Archive,
        })
    }

    /// Enumerate a real directory.
    ///
    /// Children whose stat fails are still listed, as files with empty
    /// metadata, rather than failing the whole listing.
    pub fn list_real(&self, dir: &Path) -> Result<Vec<DirectoryEntry>, VfsError> {
        let names = self.fs.read_dir(dir).map_err(|e| VfsError::io(dir, e))?;
        let mut entries = Vec::with_capacity(names.len());

        for name in names {
            let path = dir.join(&name);
            let name = CompactString::from(name.to_string_lossy());

            let stat = match self.fs.symlink_metadata(&path) {
                Ok(stat) => stat,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "stat failed, listing without metadata");
                    entries.push(DirectoryEntry::new(name, path, EntryKind::File));
                    continue;
                }
            };

            let kind = match stat.kind {
                FileKind::Directory => EntryKind::Directory,
                FileKind::Symlink => EntryKind::Symlink,
                FileKind::File | FileKind::Other => EntryKind::File,
            };
            let size = if kind.is_dir() { 0 } else { stat.len };

            let mut entry = DirectoryEntry::new(name, &path, kind)
                .with_size(size)
                .with_modified(stat.modified)
                .with_created(stat.created);

            if kind.is_symlink() {
                if let Ok(target) = self.fs.read_link(&path) {
                    entry = entry.with_symlink_target(target.to_string_lossy());
                }
            }

            entries.push(entry);
        }

        sort_entries(&mut entries);
        Ok(entries)
    }

    /// Immediate children of a location inside an archive.
    pub fn list_archive(&self, location: &ArchiveLocation) -> Result<Vec<DirectoryEntry>, VfsError> {
        let records = self.archive_records(location)?;

        if !archive::location_exists(&records, location) {
            return Err(VfsError::not_found(location.virtual_path()));
        }

        let mut entries = archive::children_of(&records, location);
        sort_entries(&mut entries);
        Ok(entries)
    }

    /// The full entry table of the archive containing `location`.
    pub fn archive_records(&self, location: &ArchiveLocation) -> Result<Vec<ArchiveRecord>, VfsError> {
        self.archives.records(location)
    }
}

impl std::fmt::Debug for Lister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lister")
            .field("resolver", &self.resolver)
            .field("archives", &self.archives.name())
            .finish_non_exhaustive()
    }
}
