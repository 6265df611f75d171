//! Two-phase copy/move execution with progress reporting.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use nestfs_core::{EngineConfig, EntryKind, FileKind, Filesystem, OperationError, VfsError};
use nestfs_list::Lister;

use crate::item::{TransferItem, TransferMode};
use crate::progress::{TransferEvent, TransferProgress, TransferReport};
use crate::run_blocking;

/// Bytes and files below one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Footprint {
    bytes: u64,
    files: u64,
}

/// Totals gathered by the scan phase.
#[derive(Debug, Default)]
struct ScanTotals {
    bytes: u64,
    files: u64,
    /// Per top-level source, for crediting atomic renames at once.
    footprints: HashMap<PathBuf, Footprint>,
}

/// One filesystem action of a recursive copy.
#[derive(Debug)]
enum CopyStep {
    Directory(PathBuf),
    File { from: PathBuf, to: PathBuf },
    Symlink { from: PathBuf, to: PathBuf },
}

/// Executes copy/move batches over the real filesystem.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    lister: Lister,
    channel_size: usize,
}

impl TransferEngine {
    /// Create an engine that sizes sources through `lister`.
    pub fn new(lister: Lister, config: &EngineConfig) -> Self {
        Self {
            lister,
            channel_size: config.progress_channel_size,
        }
    }

    fn fs(&self) -> Arc<dyn Filesystem> {
        Arc::clone(self.lister.filesystem())
    }

    /// Start an async transfer.
    ///
    /// Returns a receiver for progress updates and results. The last event is
    /// always [`TransferEvent::Complete`] or [`TransferEvent::Failed`].
    pub fn start(&self, items: Vec<TransferItem>, mode: TransferMode) -> mpsc::Receiver<TransferEvent> {
        let (tx, rx) = mpsc::channel(self.channel_size);
        let engine = self.clone();

        tokio::spawn(async move {
            let event = match engine.transfer(items, mode, &tx).await {
                Ok(report) => TransferEvent::Complete(report),
                Err(err) => TransferEvent::Failed(err),
            };
            let _ = tx.send(event).await;
        });

        rx
    }

    /// Run a batch to completion, reporting progress through `tx`.
    ///
    /// Items run in submission order. A failing item is recorded in the
    /// report and the batch moves on; only errors outside per-item handling
    /// (a crashed worker task) abort the batch.
    pub async fn transfer(
        &self,
        items: Vec<TransferItem>,
        mode: TransferMode,
        tx: &mpsc::Sender<TransferEvent>,
    ) -> Result<TransferReport, VfsError> {
        let mut report = TransferReport::new(mode);
        if items.is_empty() {
            return Ok(report);
        }

        info!(%mode, items = items.len(), "starting transfer");

        // Phase 1: scan
        let lister = self.lister.clone();
        let sources: Vec<PathBuf> = items.iter().map(|item| item.source.clone()).collect();
        let totals = run_blocking(move || Ok(scan(&lister, &sources))).await?;

        let mut progress = TransferProgress::new(totals.bytes, totals.files);
        let _ = tx.send(TransferEvent::Progress(progress.clone())).await;

        // Phase 2: execute
        for item in &items {
            progress.set_current_item(Some(item.source.clone()));

            let result = match mode {
                TransferMode::Copy => self.copy_item(item, &mut progress, tx).await,
                TransferMode::Move => {
                    let footprint = totals
                        .footprints
                        .get(&item.source)
                        .copied()
                        .unwrap_or_default();
                    self.move_item(item, footprint, &mut progress, tx).await
                }
            };

            match result {
                Ok(()) => report.succeeded += 1,
                Err(err @ VfsError::Task { .. }) => return Err(err),
                Err(err) => {
                    warn!(source = %item.source.display(), error = %err, "transfer item failed");
                    let failure = OperationError::new(&item.source, err.to_string());
                    report.failed += 1;
                    report.failures.push(failure.clone());
                    let _ = tx.send(TransferEvent::ItemFailed(failure)).await;
                }
            }
        }

        if report.is_success() {
            progress.finish();
        } else {
            progress.set_current_item(None);
        }
        report.bytes_processed = progress.processed_bytes;
        let _ = tx.send(TransferEvent::Progress(progress)).await;

        info!(
            %mode,
            succeeded = report.succeeded,
            failed = report.failed,
            "transfer finished"
        );
        Ok(report)
    }

    /// Copy one item, crediting progress per file.
    async fn copy_item(
        &self,
        item: &TransferItem,
        progress: &mut TransferProgress,
        tx: &mpsc::Sender<TransferEvent>,
    ) -> Result<(), VfsError> {
        self.ensure_parent(&item.destination).await?;

        let lister = self.lister.clone();
        let source = item.source.clone();
        let destination = item.destination.clone();
        let steps = run_blocking(move || plan_copy(&lister, &source, &destination)).await?;

        for step in steps {
            let fs = self.fs();
            match step {
                CopyStep::Directory(path) => {
                    run_blocking(move || {
                        fs.create_dir_all(&path).map_err(|e| VfsError::io(&path, e))
                    })
                    .await?;
                }
                CopyStep::File { from, to } => {
                    let bytes = run_blocking(move || {
                        fs.copy_file(&from, &to).map_err(|e| VfsError::io(&from, e))
                    })
                    .await?;
                    progress.advance(bytes, 1);
                    let _ = tx.send(TransferEvent::Progress(progress.clone())).await;
                }
                CopyStep::Symlink { from, to } => {
                    run_blocking(move || {
                        fs.copy_symlink(&from, &to).map_err(|e| VfsError::io(&from, e))
                    })
                    .await?;
                    progress.advance(0, 1);
                    let _ = tx.send(TransferEvent::Progress(progress.clone())).await;
                }
            }
        }

        Ok(())
    }

    /// Move one item: rename if possible, otherwise copy then delete.
    async fn move_item(
        &self,
        item: &TransferItem,
        footprint: Footprint,
        progress: &mut TransferProgress,
        tx: &mpsc::Sender<TransferEvent>,
    ) -> Result<(), VfsError> {
        self.ensure_parent(&item.destination).await?;

        let fs = self.fs();
        let source = item.source.clone();
        let destination = item.destination.clone();
        let renamed = run_blocking(move || Ok(fs.rename(&source, &destination))).await?;

        match renamed {
            Ok(()) => {
                progress.advance(footprint.bytes, footprint.files);
                let _ = tx.send(TransferEvent::Progress(progress.clone())).await;
                return Ok(());
            }
            Err(err) => {
                debug!(
                    source = %item.source.display(),
                    error = %err,
                    "rename failed, falling back to copy and delete"
                );
            }
        }

        self.copy_item(item, progress, tx).await?;

        let fs = self.fs();
        let source = item.source.clone();
        run_blocking(move || {
            let stat = fs
                .symlink_metadata(&source)
                .map_err(|e| VfsError::io(&source, e))?;
            let removed = if stat.is_dir() {
                fs.remove_dir_all(&source)
            } else {
                fs.remove_file(&source)
            };
            removed.map_err(|e| VfsError::io(&source, e))
        })
        .await
    }

    /// Attempt to create the destination's parent directory.
    async fn ensure_parent(&self, destination: &Path) -> Result<(), VfsError> {
        let Some(parent) = destination.parent().map(Path::to_path_buf) else {
            return Ok(());
        };
        let fs = self.fs();
        run_blocking(move || fs.create_dir_all(&parent).map_err(|e| VfsError::io(&parent, e))).await
    }
}

/// Calculate totals for a list of sources.
fn scan(lister: &Lister, sources: &[PathBuf]) -> ScanTotals {
    let mut totals = ScanTotals::default();

    for source in sources {
        let footprint = footprint(lister, source);
        totals.bytes += footprint.bytes;
        totals.files += footprint.files;
        totals.footprints.insert(source.clone(), footprint);
    }

    debug!(bytes = totals.bytes, files = totals.files, "transfer scan complete");
    totals
}

/// Bytes and files below one source. Unreadable parts count as empty.
fn footprint(lister: &Lister, source: &Path) -> Footprint {
    let stat = match lister.filesystem().symlink_metadata(source) {
        Ok(stat) => stat,
        Err(err) => {
            debug!(path = %source.display(), error = %err, "cannot stat transfer source");
            return Footprint::default();
        }
    };

    match stat.kind {
        FileKind::Directory => {}
        FileKind::Symlink => return Footprint { bytes: 0, files: 1 },
        FileKind::File | FileKind::Other => {
            return Footprint {
                bytes: stat.len,
                files: 1,
            };
        }
    }

    let mut footprint = Footprint::default();
    let mut pending = vec![source.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match lister.list_real(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(path = %dir.display(), error = %err, "skipping unreadable directory in scan");
                continue;
            }
        };

        for entry in entries {
            match entry.kind {
                EntryKind::Directory => pending.push(entry.path),
                EntryKind::Symlink => footprint.files += 1,
                EntryKind::File => {
                    footprint.files += 1;
                    footprint.bytes += entry.size;
                }
            }
        }
    }

    footprint
}

/// Flatten a recursive copy into ordered steps; parents precede children.
fn plan_copy(lister: &Lister, source: &Path, destination: &Path) -> Result<Vec<CopyStep>, VfsError> {
    let stat = lister
        .filesystem()
        .symlink_metadata(source)
        .map_err(|e| VfsError::io(source, e))?;

    match stat.kind {
        FileKind::Directory => {}
        FileKind::Symlink => {
            return Ok(vec![CopyStep::Symlink {
                from: source.to_path_buf(),
                to: destination.to_path_buf(),
            }]);
        }
        FileKind::File => {
            return Ok(vec![CopyStep::File {
                from: source.to_path_buf(),
                to: destination.to_path_buf(),
            }]);
        }
        FileKind::Other => {
            return Err(VfsError::io(
                source,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
    }

    let mut steps = vec![CopyStep::Directory(destination.to_path_buf())];
    let mut pending = vec![(source.to_path_buf(), destination.to_path_buf())];

    while let Some((from_dir, to_dir)) = pending.pop() {
        for entry in lister.list_real(&from_dir)? {
            let to = to_dir.join(entry.name.as_str());
            match entry.kind {
                EntryKind::Directory => {
                    steps.push(CopyStep::Directory(to.clone()));
                    pending.push((entry.path, to));
                }
                EntryKind::File if is_special(lister, &entry.path) => {
                    warn!(path = %entry.path.display(), "skipping special file");
                }
                EntryKind::File => steps.push(CopyStep::File {
                    from: entry.path,
                    to,
                }),
                EntryKind::Symlink => steps.push(CopyStep::Symlink {
                    from: entry.path,
                    to,
                }),
            }
        }
    }

    Ok(steps)
}

/// FIFOs, sockets and devices; listings report them as files.
fn is_special(lister: &Lister, path: &Path) -> bool {
    matches!(
        lister.filesystem().symlink_metadata(path),
        Ok(stat) if stat.kind == FileKind::Other
    )
}
