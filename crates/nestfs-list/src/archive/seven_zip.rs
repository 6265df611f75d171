//! Archive listing through the external `7z` tool.

use std::io;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::SystemTime;

use chrono::{Local, NaiveDateTime, TimeZone};
use tracing::{debug, warn};

use nestfs_core::{ArchiveLocation, VfsError};

use super::{ArchiveBackend, ArchiveRecord};

/// Line separating the archive header block from the entry blocks.
const ENTRIES_SEPARATOR: &str = "----------";

/// Lists archives by running `7z l -slt`.
#[derive(Debug, Clone)]
pub struct SevenZip {
    program: String,
}

impl SevenZip {
    /// Create a backend invoking `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Check if the program can be found on `PATH`.
    pub fn is_installed(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    /// `7z l -slt ARCHIVE`.
    fn list_direct(&self, archive: &Path) -> Result<Output, VfsError> {
        Command::new(&self.program)
            .args(["l", "-slt"])
            .arg(archive)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(archive, e))
    }

    /// `7z x -so ARCHIVE | 7z l -slt -si -ttar`.
    ///
    /// 7z cannot see through the compression layer of a tarball when listing,
    /// so the outer stream is decompressed and the result listed as tar.
    fn list_compressed_tar(&self, archive: &Path) -> Result<Output, VfsError> {
        let mut decompress = Command::new(&self.program)
            .args(["x", "-so"])
            .arg(archive)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| self.spawn_error(archive, e))?;

        let Some(stream) = decompress.stdout.take() else {
            let _ = decompress.kill();
            return Err(self.tool_error(archive, "decompression stream unavailable"));
        };

        let listing = Command::new(&self.program)
            .args(["l", "-slt", "-si", "-ttar"])
            .stdin(Stdio::from(stream))
            .output()
            .map_err(|e| self.spawn_error(archive, e));

        let status = decompress.wait();
        let listing = listing?;

        match status {
            Ok(status) if !status.success() => {
                return Err(self.tool_error(archive, format!("decompression exited with {status}")));
            }
            Err(e) => return Err(self.tool_error(archive, e.to_string())),
            Ok(_) => {}
        }

        Ok(listing)
    }

    fn spawn_error(&self, archive: &Path, err: io::Error) -> VfsError {
        let message = if err.kind() == io::ErrorKind::NotFound {
            "not installed".to_string()
        } else {
            err.to_string()
        };
        self.tool_error(archive, message)
    }

    fn tool_error(&self, archive: &Path, message: impl Into<String>) -> VfsError {
        VfsError::ToolUnavailable {
            tool: self.program.clone(),
            archive: archive.to_path_buf(),
            message: message.into(),
        }
    }
}

impl ArchiveBackend for SevenZip {
    fn name(&self) -> &str {
        &self.program
    }

    fn records(&self, location: &ArchiveLocation) -> Result<Vec<ArchiveRecord>, VfsError> {
        let archive = location.archive_file_path.as_path();
        debug!(
            archive = %archive.display(),
            pipeline = location.is_compressed_tar_pipeline,
            "listing archive with {}", self.program
        );

        let output = if location.is_compressed_tar_pipeline {
            self.list_compressed_tar(archive)?
        } else {
            self.list_direct(archive)?
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(archive = %archive.display(), status = %output.status, "archive listing failed");
            return Err(self.tool_error(archive, stderr.trim().to_string()));
        }

        Ok(parse_technical_listing(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse the block-per-entry output of `7z l -slt`.
///
/// Everything before the `----------` line describes the archive itself and
/// is skipped. Each following block of `Key = Value` lines ends at a blank
/// line; blocks without a `Path` are ignored.
pub fn parse_technical_listing(text: &str) -> Vec<ArchiveRecord> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines
        .iter()
        .position(|line| line.trim() == ENTRIES_SEPARATOR)
        .map_or(0, |index| index + 1);

    let mut records = Vec::new();
    let mut block = PendingRecord::default();

    for line in &lines[start..] {
        if line.trim().is_empty() {
            records.extend(block.finish());
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "Path" => block.path = Some(value.to_string()),
            "Size" => block.size = value.parse().unwrap_or(0),
            "Attributes" => block.attributes = value.to_string(),
            "Folder" => block.is_folder = value == "+",
            "Modified" => block.modified = parse_modified(value),
            _ => {}
        }
    }
    records.extend(block.finish());

    records
}

#[derive(Debug, Default)]
struct PendingRecord {
    path: Option<String>,
    attributes: String,
    is_folder: bool,
    size: u64,
    modified: Option<SystemTime>,
}

impl PendingRecord {
    fn finish(&mut self) -> Option<ArchiveRecord> {
        let block = std::mem::take(self);
        block.path.map(|path| ArchiveRecord {
            path,
            attributes: block.attributes,
            is_folder: block.is_folder,
            size: block.size,
            modified: block.modified,
        })
    }
}

/// Parse `2024-03-01 12:30:45[.fraction]` as local time.
fn parse_modified(value: &str) -> Option<SystemTime> {
    let whole_seconds = value.split('.').next()?;
    let naive = NaiveDateTime::parse_from_str(whole_seconds, "%Y-%m-%d %H:%M:%S").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(SystemTime::from)
}
