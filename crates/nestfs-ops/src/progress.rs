//! Progress reporting types for transfers.

use std::path::PathBuf;

use nestfs_core::{OperationError, VfsError};

use crate::item::TransferMode;

/// Byte and file counters for one batch.
///
/// Totals are fixed by the scan phase. Processed counters only grow and
/// never pass their totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    /// Total bytes to process; at least 1.
    pub total_bytes: u64,
    /// Number of bytes processed so far.
    pub processed_bytes: u64,
    /// Total number of files to process.
    pub total_files: u64,
    /// Number of files completed.
    pub processed_files: u64,
    /// The item currently being processed.
    pub current_item: Option<PathBuf>,
}

impl TransferProgress {
    /// Create a progress tracker from scanned totals.
    pub fn new(total_bytes: u64, total_files: u64) -> Self {
        Self {
            total_bytes: total_bytes.max(1),
            processed_bytes: 0,
            total_files,
            processed_files: 0,
            current_item: None,
        }
    }

    /// Get the progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        let ratio = self.processed_bytes as f64 / self.total_bytes as f64;
        (ratio * 100.0).clamp(0.0, 100.0)
    }

    /// Credit completed files and their bytes.
    pub fn advance(&mut self, bytes: u64, files: u64) {
        self.processed_bytes = self.processed_bytes.saturating_add(bytes).min(self.total_bytes);
        self.processed_files = self.processed_files.saturating_add(files).min(self.total_files);
    }

    /// Update the item currently being processed.
    pub fn set_current_item(&mut self, path: Option<PathBuf>) {
        self.current_item = path;
    }

    /// Mark every scanned byte and file as processed.
    pub fn finish(&mut self) {
        self.processed_bytes = self.total_bytes;
        self.processed_files = self.total_files;
        self.current_item = None;
    }
}

/// Result of a batch that ran to completion.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub mode: TransferMode,
    /// Number of items successfully transferred.
    pub succeeded: usize,
    /// Number of items that failed.
    pub failed: usize,
    /// Total bytes processed.
    pub bytes_processed: u64,
    /// One entry per failed item.
    pub failures: Vec<OperationError>,
}

impl TransferReport {
    /// Create an empty report.
    pub fn new(mode: TransferMode) -> Self {
        Self {
            mode,
            succeeded: 0,
            failed: 0,
            bytes_processed: 0,
            failures: Vec::new(),
        }
    }

    /// Check if every item succeeded.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Get a human-readable summary of the batch.
    pub fn summary(&self) -> String {
        let action = match self.mode {
            TransferMode::Copy => "Copied",
            TransferMode::Move => "Moved",
        };

        if self.failed == 0 {
            format!("{} {} items", action, self.succeeded)
        } else {
            format!("{} {} items, {} failed", action, self.succeeded, self.failed)
        }
    }

    /// Treat any failed item as an error.
    pub fn into_result(self) -> Result<Self, VfsError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(VfsError::PartialFailure {
                failed: self.failed,
                total: self.failed + self.succeeded,
            })
        }
    }
}

/// Events sent through the channel while a batch runs.
#[derive(Debug)]
pub enum TransferEvent {
    /// Progress update.
    Progress(TransferProgress),
    /// An item failed; the batch continues.
    ItemFailed(OperationError),
    /// The batch completed.
    Complete(TransferReport),
    /// The batch was aborted by an error outside per-item handling.
    Failed(VfsError),
}
