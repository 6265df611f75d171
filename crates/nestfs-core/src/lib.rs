//! Core types and traits for nestfs.
//!
//! This crate provides the data model shared by the lister, the transfer
//! engine and the size scheduler: directory entries, archive locations,
//! the error taxonomy, engine configuration and the real-filesystem
//! access layer every component goes through.

mod config;
mod entry;
mod error;
mod fs;
mod location;

pub use config::{ArchiveBackendKind, EngineConfig, EngineConfigBuilder};
pub use entry::{extension_of, sort_entries, DirectoryEntry, EntryKind};
pub use error::{OperationError, VfsError};
pub use fs::{FileKind, FileStat, Filesystem, LocalFs};
pub use location::{is_compressed_tar, normalize_internal_path, ArchiveLocation};
