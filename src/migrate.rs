//! One-shot rewrite of hardcoded backend addresses in frontend sources.
//!
//! Walks a source tree, skipping hidden directories, `node_modules`, and
//! `dist`, and replaces every literal occurrence of the local backend address
//! with the production one. Files are rewritten only when their content
//! changes. Per-file failures are logged and collected in the report; the
//! walk always runs to completion.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

pub const DEFAULT_ROOT: &str = "./src";
pub const LOCAL_ADDRESS: &str = "http://localhost:5000";
pub const PRODUCTION_ADDRESS: &str = "https://cosmicproject-backend-1.onrender.com";
pub const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx"];
pub const SKIPPED_DIRS: &[&str] = &["node_modules", "dist"];

#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to list {}: {source}", .path.display())]
    ListDir { path: PathBuf, source: io::Error },
    #[error("failed to inspect {}: {source}", .path.display())]
    Stat { path: PathBuf, source: io::Error },
}

impl MigrateError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. }
            | Self::Write { path, .. }
            | Self::ListDir { path, .. }
            | Self::Stat { path, .. } => path,
        }
    }
}

/// Outcome of a tree walk.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Candidate source files examined.
    pub scanned: usize,
    /// Files whose content changed (or would change, in a dry run).
    pub updated: Vec<PathBuf>,
    pub failed: Vec<MigrateError>,
}

impl MigrationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRewrite {
    pub from: String,
    pub to: String,
    pub extensions: Vec<String>,
    pub dry_run: bool,
}

impl Default for UrlRewrite {
    fn default() -> Self {
        Self {
            from: LOCAL_ADDRESS.to_owned(),
            to: PRODUCTION_ADDRESS.to_owned(),
            extensions: SOURCE_EXTENSIONS.iter().map(|e| (*e).to_owned()).collect(),
            dry_run: false,
        }
    }
}

impl UrlRewrite {
    /// Replace every occurrence of `from`. `None` when nothing would change.
    #[must_use]
    pub fn rewrite_text(&self, text: &str) -> Option<String> {
        if self.from.is_empty() || !text.contains(&self.from) {
            return None;
        }
        let replaced = text.replace(&self.from, &self.to);
        (replaced != text).then_some(replaced)
    }

    /// Rewrite one file in place. Returns whether the content changed.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError`] if the file cannot be read or written.
    pub fn rewrite_file(&self, path: &Path) -> Result<bool, MigrateError> {
        let content =
            fs::read_to_string(path).map_err(|source| MigrateError::Read { path: path.to_path_buf(), source })?;
        let Some(replaced) = self.rewrite_text(&content) else {
            return Ok(false);
        };
        if !self.dry_run {
            fs::write(path, replaced).map_err(|source| MigrateError::Write { path: path.to_path_buf(), source })?;
        }
        Ok(true)
    }

    /// Walk `root` and rewrite every candidate file beneath it.
    #[must_use]
    pub fn rewrite_tree(&self, root: &Path) -> MigrationReport {
        let mut report = MigrationReport::default();
        self.walk(root, &mut report);
        report
    }

    fn walk(&self, dir: &Path, report: &mut MigrationReport) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(source) => {
                error!(path = %dir.display(), error = %source, "cannot list directory");
                report.failed.push(MigrateError::ListDir { path: dir.to_path_buf(), source });
                return;
            }
        };

        let mut children = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => children.push(entry.path()),
                Err(source) => {
                    error!(path = %dir.display(), error = %source, "cannot read directory entry");
                    report.failed.push(MigrateError::ListDir { path: dir.to_path_buf(), source });
                }
            }
        }
        children.sort();

        for path in children {
            // Links are followed for files; linked directories are not entered.
            let linked = match fs::symlink_metadata(&path) {
                Ok(meta) => meta.file_type().is_symlink(),
                Err(source) => {
                    self.record_stat_failure(path, source, report);
                    continue;
                }
            };
            let meta = match fs::metadata(&path) {
                Ok(meta) => meta,
                Err(source) => {
                    self.record_stat_failure(path, source, report);
                    continue;
                }
            };

            if meta.is_dir() {
                if linked {
                    debug!(path = %path.display(), "not following linked directory");
                } else if !is_skipped_dir(&path) {
                    self.walk(&path, report);
                }
            } else if meta.is_file() && self.is_candidate(&path) {
                report.scanned += 1;
                match self.rewrite_file(&path) {
                    Ok(true) => {
                        info!(path = %path.display(), dry_run = self.dry_run, "updated");
                        report.updated.push(path);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        error!(error = %e, "error processing file");
                        report.failed.push(e);
                    }
                }
            }
        }
    }

    fn record_stat_failure(&self, path: PathBuf, source: io::Error, report: &mut MigrationReport) {
        // Dangling links only matter when they look like sources.
        if source.kind() == io::ErrorKind::NotFound && !self.is_candidate(&path) {
            debug!(path = %path.display(), "skipping dangling entry");
            return;
        }
        error!(path = %path.display(), error = %source, "cannot inspect entry");
        report.failed.push(MigrateError::Stat { path, source });
    }

    fn is_candidate(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|want| want == ext))
    }
}

fn is_skipped_dir(path: &Path) -> bool {
    let name = path.file_name().unwrap_or_default().to_string_lossy();
    name.starts_with('.') || SKIPPED_DIRS.iter().any(|skip| name == *skip)
}

#[cfg(test)]
#[path = "migrate_test.rs"]
mod tests;
