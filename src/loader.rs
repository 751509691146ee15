//! Source-file loader.
//!
//! Walks a working copy, keeps files matching the include globs, and reads
//! each one as UTF-8. Unreadable files are reported in
//! [`LoadReport::skipped`] rather than failing the load.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::LoaderConfig;
use crate::models::Document;

/// A file that was matched but could not be loaded.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a best-effort load.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub skipped: Vec<SkippedFile>,
}

pub fn load_documents(repository_id: &str, root: &Path, config: &LoaderConfig) -> Result<LoadReport> {
    if !root.exists() {
        bail!("Repository path does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string()];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut report = LoadReport::default();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                debug!(path = %path.display(), error = %e, "skipping unreadable entry");
                report.skipped.push(SkippedFile {
                    path,
                    reason: e.to_string(),
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => report.documents.push(Document::new(
                content,
                repository_id,
                path.to_string_lossy(),
            )),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable file");
                report.skipped.push(SkippedFile {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        }
    }

    // Sort for deterministic ordering
    report
        .documents
        .sort_by(|a, b| a.metadata.file_path.cmp(&b.metadata.file_path));

    Ok(report)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
