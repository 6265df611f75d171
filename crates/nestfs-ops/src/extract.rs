//! Full-archive extraction through the external tool.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::info;

use nestfs_core::VfsError;

use crate::run_blocking;

/// Extract every member of `archive` into `destination`.
///
/// Runs `<tool> x -y -o<destination> <archive>`, overwriting existing files.
/// The destination is created by the tool if missing.
pub async fn extract_archive(tool: &str, archive: &Path, destination: &Path) -> Result<(), VfsError> {
    let tool = tool.to_string();
    let archive = archive.to_path_buf();
    let destination = destination.to_path_buf();

    info!(archive = %archive.display(), destination = %destination.display(), "extracting archive");

    run_blocking(move || {
        let unavailable = |message: String| VfsError::ToolUnavailable {
            tool: tool.clone(),
            archive: archive.clone(),
            message,
        };

        let mut output_flag = std::ffi::OsString::from("-o");
        output_flag.push(destination.as_os_str());

        let output = Command::new(&tool)
            .arg("x")
            .arg("-y")
            .arg(output_flag)
            .arg(&archive)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => unavailable("not installed".to_string()),
                _ => unavailable(err.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(unavailable(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    })
    .await
}
