//! Pure-Rust archive listing for zip and (compressed) tar files.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::{Duration, SystemTime};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use tracing::debug;
use xz2::read::XzDecoder;

use nestfs_core::{ArchiveLocation, VfsError};

use super::{ArchiveBackend, ArchiveRecord};

/// Archive formats the builtin reader understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Zip,
    Tar,
    TarGz,
    TarXz,
    TarBz2,
}

impl Format {
    fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_lowercase();
        let format = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Self::TarGz
        } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
            Self::TarXz
        } else if name.ends_with(".tar.bz2") || name.ends_with(".tbz2") || name.ends_with(".tbz") {
            Self::TarBz2
        } else if name.ends_with(".tar") {
            Self::Tar
        } else if [".zip", ".jar", ".war", ".ear", ".apk", ".epub"]
            .iter()
            .any(|ext| name.ends_with(ext))
        {
            Self::Zip
        } else {
            return None;
        };
        Some(format)
    }
}

/// Reads archive entry tables in-process.
///
/// Formats it cannot read are reported as requiring the external tool.
#[derive(Debug, Clone)]
pub struct BuiltinArchives {
    fallback_tool: String,
}

impl BuiltinArchives {
    /// Create a reader; `fallback_tool` is named in errors for unsupported formats.
    pub fn new(fallback_tool: impl Into<String>) -> Self {
        Self {
            fallback_tool: fallback_tool.into(),
        }
    }

    /// Check if the builtin reader can list this file.
    pub fn supports(path: &Path) -> bool {
        Format::detect(path).is_some()
    }
}

impl ArchiveBackend for BuiltinArchives {
    fn name(&self) -> &str {
        "builtin"
    }

    fn records(&self, location: &ArchiveLocation) -> Result<Vec<ArchiveRecord>, VfsError> {
        let archive = location.archive_file_path.as_path();
        let Some(format) = Format::detect(archive) else {
            return Err(VfsError::ToolUnavailable {
                tool: self.fallback_tool.clone(),
                archive: archive.to_path_buf(),
                message: "format not supported by the builtin reader".to_string(),
            });
        };
        debug!(archive = %archive.display(), ?format, "listing archive in-process");

        let file = File::open(archive).map_err(|e| VfsError::io(archive, e))?;
        let reader = BufReader::new(file);

        match format {
            Format::Zip => zip_records(reader, archive),
            Format::Tar => tar_records(reader, archive),
            Format::TarGz => tar_records(GzDecoder::new(reader), archive),
            Format::TarXz => tar_records(XzDecoder::new(reader), archive),
            Format::TarBz2 => tar_records(BzDecoder::new(reader), archive),
        }
    }
}

fn zip_records(reader: BufReader<File>, archive: &Path) -> Result<Vec<ArchiveRecord>, VfsError> {
    let mut zip = zip::ZipArchive::new(reader).map_err(|e| corrupt(archive, e))?;
    let mut records = Vec::with_capacity(zip.len());

    for index in 0..zip.len() {
        let entry = zip.by_index_raw(index).map_err(|e| corrupt(archive, e))?;
        let is_folder = entry.is_dir();
        records.push(ArchiveRecord {
            path: entry.name().to_string(),
            attributes: if is_folder { "D" } else { "A" }.to_string(),
            is_folder,
            size: entry.size(),
            modified: None,
        });
    }

    Ok(records)
}

fn tar_records<R: Read>(reader: R, archive: &Path) -> Result<Vec<ArchiveRecord>, VfsError> {
    let mut tar = tar::Archive::new(reader);
    let entries = tar.entries().map_err(|e| corrupt(archive, e))?;
    let mut records = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| corrupt(archive, e))?;
        let header = entry.header();
        let is_folder = header.entry_type().is_dir();
        let size = header.size().unwrap_or(0);
        let modified = header
            .mtime()
            .ok()
            .map(|secs| SystemTime::UNIX_EPOCH + Duration::from_secs(secs));
        let path = entry
            .path()
            .map_err(|e| corrupt(archive, e))?
            .to_string_lossy()
            .into_owned();

        records.push(ArchiveRecord {
            path,
            attributes: if is_folder { "D" } else { "A" }.to_string(),
            is_folder,
            size: if is_folder { 0 } else { size },
            modified,
        });
    }

    Ok(records)
}

fn corrupt(archive: &Path, err: impl std::fmt::Display) -> VfsError {
    VfsError::Archive {
        archive: archive.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(Format::detect(Path::new("a.zip")), Some(Format::Zip));
        assert_eq!(Format::detect(Path::new("A.JAR")), Some(Format::Zip));
        assert_eq!(Format::detect(Path::new("a.tar")), Some(Format::Tar));
        assert_eq!(Format::detect(Path::new("a.tgz")), Some(Format::TarGz));
        assert_eq!(Format::detect(Path::new("a.tar.xz")), Some(Format::TarXz));
        assert_eq!(Format::detect(Path::new("a.tbz")), Some(Format::TarBz2));
        assert_eq!(Format::detect(Path::new("a.rar")), None);
        assert_eq!(Format::detect(Path::new("a.7z")), None);
    }

    #[test]
    fn test_unsupported_format_names_external_tool() {
        let backend = BuiltinArchives::new("7z");
        let err = backend
            .records(&ArchiveLocation::new("/tmp/photos.rar", ""))
            .unwrap_err();
        assert!(matches!(err, VfsError::ToolUnavailable { ref tool, .. } if tool == "7z"));
    }
}
