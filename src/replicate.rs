//! Directory replication with per-file overrides.
//!
//! Copies auxiliary trees (media, static data) into the output root before or
//! while pages are rendered. Each [`CopySpec`] mirrors `from` into `to`:
//!
//! ```text
//! static/data/                 html/data/
//! ├── index.json      ──────▶  ├── index.json       (override: minified)
//! ├── about/                   ├── about/
//! │   └── index.json  ──────▶  │   └── index.json   (override: minified)
//! └── logo.svg        ──────▶  └── logo.svg         (raw byte copy)
//! ```
//!
//! Directories are mirrored even when empty. Files go through the copy's
//! [`CopyOverride`] when its predicate matches and are byte-copied otherwise.
//!
//! A missing source root, or any single failing file, aborts that copy. Files
//! already copied stay on disk; callers must not treat a failed destination as
//! complete.

use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ReplicateError {
    #[error("source directory not found: {0}")]
    SourceMissing(PathBuf),
    #[error("source is not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("failed to list source tree: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("IO error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("override failed for {path}: {source}")]
    Override { path: PathBuf, source: io::Error },
}

/// Replacement copy action for a subset of files.
///
/// `matches` sees the source path; when it returns true, `copy` is called
/// instead of a raw byte copy and is responsible for writing `dest`.
pub trait CopyOverride: Send + Sync {
    fn matches(&self, path: &Path) -> bool;

    fn copy(&self, src: &Path, dest: &Path) -> io::Result<()>;
}

/// Re-serializes `.json` files without whitespace while copying.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinifyJson;

impl CopyOverride for MinifyJson {
    fn matches(&self, path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == "json")
    }

    fn copy(&self, src: &Path, dest: &Path) -> io::Result<()> {
        let raw = fs::read_to_string(src)?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        fs::write(dest, serde_json::to_string(&value)?)
    }
}

/// One tree to mirror into the output.
#[derive(Clone)]
pub struct CopySpec {
    pub from: PathBuf,
    pub to: PathBuf,
    /// Progress line shown instead of the generic "Copying files from ..." one.
    pub message: Option<String>,
    pub override_with: Option<Arc<dyn CopyOverride>>,
}

impl CopySpec {
    pub fn new(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            message: None,
            override_with: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_override(mut self, hook: impl CopyOverride + 'static) -> Self {
        self.override_with = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for CopySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopySpec")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("message", &self.message)
            .field("override_with", &self.override_with.is_some())
            .finish()
    }
}

/// What one copy spec did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CopyReport {
    pub from: PathBuf,
    pub to: PathBuf,
    pub files_copied: usize,
    pub files_overridden: usize,
    pub dirs_created: usize,
}

/// Mirror one spec.
pub fn replicate(spec: &CopySpec) -> Result<CopyReport, ReplicateError> {
    copy_tree(&spec.from, &spec.to, spec.override_with.as_deref())
}

/// Recursively mirror `src` into `dest`, routing matching files through `hook`.
pub fn copy_tree(
    src: &Path,
    dest: &Path,
    hook: Option<&dyn CopyOverride>,
) -> Result<CopyReport, ReplicateError> {
    match fs::metadata(src) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(ReplicateError::NotADirectory(src.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ReplicateError::SourceMissing(src.to_path_buf()));
        }
        Err(source) => {
            return Err(ReplicateError::Io {
                path: src.to_path_buf(),
                source,
            });
        }
    }

    let mut report = CopyReport {
        from: src.to_path_buf(),
        to: dest.to_path_buf(),
        ..Default::default()
    };

    fs::create_dir_all(dest).map_err(|source| ReplicateError::Io {
        path: dest.to_path_buf(),
        source,
    })?;

    // Pre-order walk: a directory is always yielded before anything inside it.
    for entry in WalkDir::new(src)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|source| ReplicateError::Io {
                path: target.clone(),
                source,
            })?;
            report.dirs_created += 1;
            continue;
        }

        match hook {
            Some(hook) if hook.matches(entry.path()) => {
                hook.copy(entry.path(), &target)
                    .map_err(|source| ReplicateError::Override {
                        path: entry.path().to_path_buf(),
                        source,
                    })?;
                report.files_overridden += 1;
            }
            _ => {
                fs::copy(entry.path(), &target).map_err(|source| ReplicateError::Io {
                    path: entry.path().to_path_buf(),
                    source,
                })?;
                report.files_copied += 1;
            }
        }
    }

    debug!(
        from = %src.display(),
        to = %dest.display(),
        files = report.files_copied + report.files_overridden,
        "tree replicated"
    );
    Ok(report)
}
