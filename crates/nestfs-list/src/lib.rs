//! Path resolution and directory listing for nestfs.
//!
//! This crate presents real directories and the interior of archive files
//! as one tree.
//!
//! # Overview
//!
//! - [`PathResolver`] decides whether a path is a real filesystem entry, a
//!   location inside an archive, or nothing at all.
//! - [`Lister`] turns a resolved path into a sorted [`Listing`], enumerating
//!   real directories directly and archives through an [`ArchiveBackend`].
//!
//! # Example
//!
//! ```rust,no_run
//! use nestfs_list::{EngineConfig, Lister};
//!
//! let lister = Lister::local(&EngineConfig::default());
//! let listing = lister.list("/downloads/sources.zip/src".as_ref()).unwrap();
//!
//! for entry in &listing.entries {
//!     println!("{} ({} bytes)", entry.name, entry.size);
//! }
//! ```

mod archive;
mod lister;
mod resolve;

pub use archive::{
    archive_backend, children_of, parse_technical_listing, total_file_size, ArchiveBackend,
    ArchiveRecord, BuiltinArchives, SevenZip,
};
pub use lister::{Lister, Listing};
pub use resolve::{PathResolver, RealPath, Resolution};

// Re-export core types for convenience
pub use nestfs_core::{
    ArchiveBackendKind, ArchiveLocation, DirectoryEntry, EngineConfig, EntryKind, FileKind,
    FileStat, Filesystem, LocalFs, VfsError,
};
