//! Projections of the virtual file set used by the editor shell.

use crate::session::{FileSet, SessionId};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Conventional entry points, most specific first.
const ENTRY_CANDIDATES: [&str; 13] = [
    "/index.html",
    "/public/index.html",
    "/src/index.html",
    "/src/main.tsx",
    "/src/main.jsx",
    "/src/index.tsx",
    "/src/index.jsx",
    "/src/App.tsx",
    "/src/App.jsx",
    "/src/main.js",
    "/src/index.js",
    "/main.py",
    "/src/main.rs",
];

/// Picks the file the editor opens on.
pub fn entry_file(files: &FileSet) -> Option<&str> {
    for candidate in ENTRY_CANDIDATES {
        let relative = candidate.trim_start_matches('/');
        if let Some(path) = files
            .paths()
            .find(|path| *path == candidate || *path == relative)
        {
            return Some(path);
        }
    }
    files.paths().next()
}

/// Picks the file a browser can open directly: the first HTML entry point,
/// else any HTML file, else the editor entry.
pub fn browser_entry(files: &FileSet) -> Option<&str> {
    ENTRY_CANDIDATES
        .iter()
        .copied()
        .filter(|candidate| is_html(candidate))
        .find_map(|candidate| {
            let relative = candidate.trim_start_matches('/');
            files
                .paths()
                .find(|path| *path == candidate || *path == relative)
        })
        .or_else(|| files.paths().find(|path| is_html(path)))
        .or_else(|| entry_file(files))
}

fn is_html(path: &str) -> bool {
    language_for(path) == "html"
}

pub fn language_for(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "html" | "htm" => "html",
        "css" | "scss" => "css",
        "js" | "mjs" | "cjs" | "jsx" => "js",
        "ts" | "tsx" => "ts",
        "json" => "json",
        "md" => "md",
        "py" => "py",
        "rs" => "rs",
        "toml" => "toml",
        "yml" | "yaml" => "yaml",
        "svg" | "xml" => "xml",
        _ => "text",
    }
}

/// Directory tree over the file set for the explorer pane.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExplorerNode {
    pub dirs: BTreeMap<String, ExplorerNode>,
    /// `(name, full path)` of files directly in this directory.
    pub files: Vec<(String, String)>,
}

impl ExplorerNode {
    pub fn build(files: &FileSet) -> Self {
        let mut root = ExplorerNode::default();
        for path in files.paths() {
            let mut parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
            let Some(name) = parts.pop() else {
                continue;
            };

            let mut node = &mut root;
            for dir in parts {
                node = node.dirs.entry(dir.to_string()).or_default();
            }
            node.files.push((name.to_string(), path.to_string()));
        }
        root
    }

    pub fn file_count(&self) -> usize {
        self.files.len() + self.dirs.values().map(ExplorerNode::file_count).sum::<usize>()
    }
}

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("nothing to preview")]
    Empty,

    #[error("refusing to write outside the preview directory: {0}")]
    UnsafePath(String),

    #[error("preview target {} is not inside {}", dir.display(), root.display())]
    OutsideRoot { root: PathBuf, dir: PathBuf },

    #[error("failed to write preview file {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}

fn relative_path(path: &str) -> Result<PathBuf, PreviewError> {
    let relative = Path::new(path.trim_start_matches('/'));
    let safe = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if !safe || relative.as_os_str().is_empty() {
        return Err(PreviewError::UnsafePath(path.to_string()));
    }
    Ok(relative.to_path_buf())
}

/// Preview directory for a session under `root`.
///
/// Session ids are opaque server strings; only ASCII alphanumerics, `-` and
/// `_` survive, so the result is always a single child of `root`.
pub fn session_dir(root: &Path, session_id: &SessionId) -> PathBuf {
    let name: String = session_id
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .take(64)
        .collect();
    if name.is_empty() {
        root.join("current")
    } else {
        root.join(name)
    }
}

fn ensure_inside(root: &Path, dir: &Path) -> Result<(), PreviewError> {
    let inside = dir.strip_prefix(root).is_ok_and(|rest| {
        rest.components().next().is_some()
            && rest
                .components()
                .all(|component| matches!(component, Component::Normal(_)))
    });
    if inside {
        Ok(())
    } else {
        Err(PreviewError::OutsideRoot {
            root: root.to_path_buf(),
            dir: dir.to_path_buf(),
        })
    }
}

/// Writes the snapshot under `dir`, replacing earlier contents, and returns
/// the on-disk location of the page to open in a browser.
///
/// `dir` must be strictly inside `root`; it is removed before writing.
pub fn materialize(files: &FileSet, root: &Path, dir: &Path) -> Result<PathBuf, PreviewError> {
    ensure_inside(root, dir)?;
    let entry = browser_entry(files).ok_or(PreviewError::Empty)?;
    let targets = files
        .iter()
        .map(|(path, content)| relative_path(path).map(|relative| (dir.join(relative), content)))
        .collect::<Result<Vec<_>, _>>()?;

    let write_error = |path: &Path, source: io::Error| PreviewError::Write {
        path: path.to_path_buf(),
        source,
    };
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|err| write_error(dir, err))?;
    }
    for (target, content) in &targets {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| write_error(parent, err))?;
        }
        fs::write(target, content).map_err(|err| write_error(target.as_path(), err))?;
    }

    Ok(dir.join(relative_path(entry)?))
}
