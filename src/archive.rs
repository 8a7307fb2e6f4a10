//! Project archives sent to the agent service on upload.
//!
//! The extension check here is advisory: it keeps obviously wrong files from
//! ever reaching the network, the service still decides what it accepts.

use std::fs;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const ARCHIVE_EXTENSIONS: [&str; 1] = ["zip"];

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("{} is not a .zip archive", .0.display())]
    NotAnArchive(PathBuf),

    #[error("{} contains no files", .0.display())]
    EmptyDirectory(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to pack {}: {source}", path.display())]
    Pack {
        path: PathBuf,
        source: zip::result::ZipError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Archive {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Loads a `.zip` file as-is, or packs a project directory into one.
    pub fn load(path: &Path) -> Result<Self, ArchiveError> {
        if path.is_dir() {
            return pack_directory(path);
        }

        if !is_archive_path(path) {
            return Err(ArchiveError::NotAnArchive(path.to_path_buf()));
        }

        let bytes = fs::read(path).map_err(|source| ArchiveError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(display_name(path, "project.zip"), bytes))
    }

    pub fn size_label(&self) -> String {
        let len = self.bytes.len() as f64;
        if len >= 1024.0 * 1024.0 {
            format!("{:.1} MiB", len / (1024.0 * 1024.0))
        } else if len >= 1024.0 {
            format!("{:.1} KiB", len / 1024.0)
        } else {
            format!("{} B", self.bytes.len())
        }
    }
}

pub fn is_archive_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ARCHIVE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

fn should_skip_dir(path: &Path) -> bool {
    matches!(
        path.file_name().and_then(|name| name.to_str()),
        Some(".git") | Some("target") | Some("node_modules") | Some("dist")
    )
}

fn display_name(path: &Path, fallback: &str) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| fallback.to_string())
}

fn archive_entry_name(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn collect_files(root: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = fs::read_dir(&dir).map_err(|source| ArchiveError::Read {
            path: dir.clone(),
            source,
        })?;

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if !should_skip_dir(&path) {
                    stack.push(path);
                }
                continue;
            }
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

fn pack_directory(root: &Path) -> Result<Archive, ArchiveError> {
    let files = collect_files(root)?;
    if files.is_empty() {
        return Err(ArchiveError::EmptyDirectory(root.to_path_buf()));
    }

    let pack_error = |source: zip::result::ZipError| ArchiveError::Pack {
        path: root.to_path_buf(),
        source,
    };
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for path in &files {
        let bytes = fs::read(path).map_err(|source| ArchiveError::Read {
            path: path.clone(),
            source,
        })?;
        writer
            .start_file(archive_entry_name(path, root), options)
            .map_err(pack_error)?;
        writer
            .write_all(&bytes)
            .map_err(|err| pack_error(err.into()))?;
    }

    let cursor = writer.finish().map_err(pack_error)?;
    tracing::debug!(root = %root.display(), files = files.len(), "packed project directory");
    Ok(Archive::new(
        format!("{}.zip", display_name(root, "project")),
        cursor.into_inner(),
    ))
}
