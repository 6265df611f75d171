//! Transfer engine for nestfs.
//!
//! This crate copies and moves batches of files and directories with
//! progress reporting via channels. A batch is scanned first to learn its
//! total size, then executed item by item in submission order.

mod extract;
mod item;
mod progress;
mod transfer;

pub use extract::extract_archive;
pub use item::{filter_self_drops, TransferItem, TransferMode};
pub use progress::{TransferEvent, TransferProgress, TransferReport};
pub use transfer::TransferEngine;

pub use nestfs_core::{OperationError, VfsError};

/// Run blocking filesystem work off the async runtime.
///
/// A panicked or cancelled task surfaces as [`VfsError::Task`].
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, VfsError>
where
    F: FnOnce() -> Result<T, VfsError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(VfsError::task)?
}
