use nestfs_core::{EngineConfig, FileStat, Filesystem, LocalFs};
use nestfs_list::{BuiltinArchives, Lister};
use nestfs_ops::{
    filter_self_drops, TransferEngine, TransferEvent, TransferItem, TransferMode,
    TransferProgress, TransferReport,
};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn engine_over(fs: Arc<dyn Filesystem>) -> TransferEngine {
    let config = EngineConfig::default();
    let lister = Lister::new(fs, Arc::new(BuiltinArchives::new("7z")), &config);
    TransferEngine::new(lister, &config)
}

fn engine() -> TransferEngine {
    engine_over(Arc::new(LocalFs))
}

/// Drain a batch, returning every progress snapshot, failures and the report.
async fn run(
    engine: &TransferEngine,
    items: Vec<TransferItem>,
    mode: TransferMode,
) -> (Vec<TransferProgress>, usize, TransferReport) {
    let mut rx = engine.start(items, mode);
    let mut snapshots = Vec::new();
    let mut item_failures = 0;

    while let Some(event) = rx.recv().await {
        match event {
            TransferEvent::Progress(progress) => snapshots.push(progress),
            TransferEvent::ItemFailed(_) => item_failures += 1,
            TransferEvent::Complete(report) => return (snapshots, item_failures, report),
            TransferEvent::Failed(err) => panic!("batch aborted: {err}"),
        }
    }
    panic!("channel closed without a final event");
}

/// Rename always fails, as it would across devices.
struct NoRenameFs(LocalFs);

impl Filesystem for NoRenameFs {
    fn symlink_metadata(&self, path: &Path) -> io::Result<FileStat> {
        self.0.symlink_metadata(path)
    }
    fn metadata(&self, path: &Path) -> io::Result<FileStat> {
        self.0.metadata(path)
    }
    fn read_dir(&self, path: &Path) -> io::Result<Vec<OsString>> {
        self.0.read_dir(path)
    }
    fn read_link(&self, path: &Path) -> io::Result<PathBuf> {
        self.0.read_link(path)
    }
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<u64> {
        self.0.copy_file(from, to)
    }
    fn copy_symlink(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.0.copy_symlink(from, to)
    }
    fn rename(&self, _from: &Path, _to: &Path) -> io::Result<()> {
        Err(io::Error::other("cross-device link"))
    }
    fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.0.remove_file(path)
    }
    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.0.remove_dir_all(path)
    }
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.0.create_dir_all(path)
    }
}

#[tokio::test]
async fn test_copy_two_files_reports_monotonic_progress() {
    let dir = TempDir::new().unwrap();
    let big = dir.path().join("big.bin");
    let small = dir.path().join("small.bin");
    fs::write(&big, vec![1u8; 10 * 1024 * 1024]).unwrap();
    fs::write(&small, vec![2u8; 5 * 1024 * 1024]).unwrap();

    let target = dir.path().join("target");
    let items = vec![
        TransferItem::into_directory(&big, &target),
        TransferItem::into_directory(&small, &target),
    ];

    let (snapshots, failures, report) = run(&engine(), items, TransferMode::Copy).await;

    assert_eq!(failures, 0);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.bytes_processed, 15 * 1024 * 1024);

    assert!(snapshots.len() >= 3);
    let first = &snapshots[0];
    assert_eq!(first.total_bytes, 15 * 1024 * 1024);
    assert_eq!(first.total_files, 2);
    assert_eq!(first.processed_bytes, 0);

    for pair in snapshots.windows(2) {
        assert!(pair[1].processed_bytes >= pair[0].processed_bytes);
        assert!(pair[1].percentage() >= pair[0].percentage());
    }
    assert_eq!(snapshots.last().unwrap().percentage(), 100.0);

    assert_eq!(fs::metadata(target.join("big.bin")).unwrap().len(), 10 * 1024 * 1024);
    assert_eq!(fs::metadata(target.join("small.bin")).unwrap().len(), 5 * 1024 * 1024);
    assert!(big.exists());
    assert!(small.exists());
}

#[tokio::test]
async fn test_copy_directory_tree() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("project");
    fs::create_dir_all(src.join("src/bin")).unwrap();
    fs::create_dir_all(src.join("empty")).unwrap();
    fs::write(src.join("Cargo.toml"), b"[package]").unwrap();
    fs::write(src.join("src/lib.rs"), b"pub fn f() {}").unwrap();
    fs::write(src.join("src/bin/main.rs"), b"fn main() {}").unwrap();

    let dst = dir.path().join("copy");
    let items = vec![TransferItem::new(&src, &dst)];
    let (snapshots, _, report) = run(&engine(), items, TransferMode::Copy).await;

    assert!(report.is_success());
    assert_eq!(snapshots[0].total_files, 3);
    assert_eq!(fs::read(dst.join("src/bin/main.rs")).unwrap(), b"fn main() {}");
    assert_eq!(fs::read(dst.join("Cargo.toml")).unwrap(), b"[package]");
    assert!(dst.join("empty").is_dir());
    assert!(src.join("src/lib.rs").exists());
}

#[tokio::test]
async fn test_move_renames_on_same_filesystem() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("photos");
    fs::create_dir_all(src.join("2024")).unwrap();
    fs::write(src.join("2024/a.jpg"), vec![0u8; 1000]).unwrap();

    let dst = dir.path().join("archive/photos");
    let items = vec![TransferItem::new(&src, &dst)];
    let (snapshots, _, report) = run(&engine(), items, TransferMode::Move).await;

    assert_eq!(report.summary(), "Moved 1 items");
    assert_eq!(report.bytes_processed, 1000);
    assert_eq!(snapshots.last().unwrap().percentage(), 100.0);
    assert!(!src.exists());
    assert_eq!(fs::metadata(dst.join("2024/a.jpg")).unwrap().len(), 1000);
}

#[tokio::test]
async fn test_move_falls_back_to_copy_and_delete() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("docs");
    fs::create_dir_all(src.join("inner")).unwrap();
    fs::write(src.join("inner/readme.md"), b"# docs").unwrap();
    let file = dir.path().join("loose.txt");
    fs::write(&file, b"loose").unwrap();

    let target = dir.path().join("elsewhere");
    let items = vec![
        TransferItem::into_directory(&src, &target),
        TransferItem::into_directory(&file, &target),
    ];

    let engine = engine_over(Arc::new(NoRenameFs(LocalFs)));
    let (_, failures, report) = run(&engine, items, TransferMode::Move).await;

    assert_eq!(failures, 0);
    assert_eq!(report.succeeded, 2);
    assert!(!src.exists());
    assert!(!file.exists());
    assert_eq!(fs::read(target.join("docs/inner/readme.md")).unwrap(), b"# docs");
    assert_eq!(fs::read(target.join("loose.txt")).unwrap(), b"loose");
}

#[tokio::test]
async fn test_missing_source_fails_only_that_item() {
    let dir = TempDir::new().unwrap();
    let present = dir.path().join("present.txt");
    fs::write(&present, b"here").unwrap();
    let missing = dir.path().join("missing.txt");

    let target = dir.path().join("out");
    let items = vec![
        TransferItem::into_directory(&missing, &target),
        TransferItem::into_directory(&present, &target),
    ];
    let (snapshots, failures, report) = run(&engine(), items, TransferMode::Copy).await;

    assert_eq!(failures, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].path, missing);
    assert_eq!(report.summary(), "Copied 1 items, 1 failed");
    assert!(report.into_result().is_err());

    assert_eq!(snapshots.last().unwrap().processed_bytes, 4);
    assert!(target.join("present.txt").exists());
}

#[tokio::test]
async fn test_empty_batch_completes_immediately() {
    let (snapshots, failures, report) = run(&engine(), Vec::new(), TransferMode::Copy).await;
    assert!(snapshots.is_empty());
    assert_eq!(failures, 0);
    assert_eq!(report.succeeded, 0);
    assert!(report.is_success());
}

#[tokio::test]
async fn test_self_drops_are_filtered_before_submission() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("folder");
    fs::create_dir(&src).unwrap();
    fs::write(src.join("f"), b"f").unwrap();

    let items = filter_self_drops(vec![
        TransferItem::into_directory(&src, dir.path()),
        TransferItem::into_directory(&src, &src.join("nested")),
    ]);
    assert!(items.is_empty());

    let (_, _, report) = run(&engine(), items, TransferMode::Move).await;
    assert_eq!(report.succeeded, 0);
    assert!(src.join("f").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_fifo_in_source_tree_does_not_stall_batch() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("src");
    fs::create_dir(&src).unwrap();
    fs::write(src.join("a.txt"), b"alpha").unwrap();
    let status = std::process::Command::new("mkfifo")
        .arg(src.join("pipe"))
        .status()
        .unwrap();
    assert!(status.success());
    let lone_fifo = dir.path().join("lone");
    let status = std::process::Command::new("mkfifo")
        .arg(&lone_fifo)
        .status()
        .unwrap();
    assert!(status.success());

    let target = dir.path().join("target");
    let items = vec![
        TransferItem::into_directory(&src, &target),
        TransferItem::into_directory(&lone_fifo, &target),
    ];

    let (_, failures, report) = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        run(&engine(), items, TransferMode::Copy),
    )
    .await
    .expect("batch stalled on a FIFO");

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(failures, 1);
    assert_eq!(report.failures[0].path, lone_fifo);

    assert_eq!(fs::read(target.join("src/a.txt")).unwrap(), b"alpha");
    assert!(!target.join("src/pipe").exists());
    assert!(!target.join("lone").exists());
}
