//! Repository fetcher.
//!
//! Clones each repository URL into its own temporary directory and derives
//! the short repository identifier used to name indices and group results.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;
use tracing::info;

/// Something that can materialize a repository URL into a local directory.
pub trait RepoFetcher {
    /// Populate `dest` (an existing, empty directory) with a working copy of `url`.
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Fetcher backed by the `git` command-line client.
#[derive(Debug, Clone, Default)]
pub struct GitCli {
    /// Clone with `--depth 1` instead of the full history.
    pub shallow: bool,
}

impl RepoFetcher for GitCli {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        git_clone(url, self.shallow, dest)
    }
}

/// A cloned repository. The working copy is deleted when this is dropped.
#[derive(Debug)]
pub struct ClonedRepo {
    pub id: String,
    pub url: String,
    workdir: TempDir,
}

impl ClonedRepo {
    pub fn path(&self) -> &Path {
        self.workdir.path()
    }
}

/// Clone every URL, in order, into fresh temporary directories.
///
/// Identifiers are derived and checked for collisions before anything is
/// cloned. Any failure aborts the whole batch.
pub fn clone_repos(urls: &[String], fetcher: &dyn RepoFetcher) -> Result<Vec<ClonedRepo>> {
    let ids = derive_repo_ids(urls)?;

    let mut repos = Vec::with_capacity(urls.len());
    for (url, id) in urls.iter().zip(ids) {
        let workdir = tempfile::Builder::new()
            .prefix("repo-qa-")
            .tempdir()
            .context("Failed to create temporary clone directory")?;

        info!(%url, dest = %workdir.path().display(), "cloning repository");
        fetcher
            .fetch(url, workdir.path())
            .with_context(|| format!("Failed to clone {}", url))?;

        repos.push(ClonedRepo {
            id,
            url: url.clone(),
            workdir,
        });
    }
    Ok(repos)
}

/// Derive identifiers for a batch of URLs, rejecting duplicates.
pub fn derive_repo_ids(urls: &[String]) -> Result<Vec<String>> {
    let mut seen: HashMap<String, &str> = HashMap::new();
    let mut ids = Vec::with_capacity(urls.len());

    for url in urls {
        let id = repo_id_from_url(url)?;
        if let Some(previous) = seen.insert(id.clone(), url.as_str()) {
            bail!(
                "Repository identifier '{}' is derived from both {} and {}",
                id,
                previous,
                url
            );
        }
        ids.push(id);
    }
    Ok(ids)
}

/// Last `/`-separated segment of the URL with a trailing `.git` removed.
pub fn repo_id_from_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or_default();
    let id = last.strip_suffix(".git").unwrap_or(last);

    if id.is_empty() {
        bail!("Cannot derive a repository name from URL: '{}'", url);
    }
    Ok(id.to_string())
}

fn git_clone(url: &str, shallow: bool, dest: &Path) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.arg("clone");
    if shallow {
        cmd.args(["--depth", "1"]);
    }
    cmd.arg(url);
    cmd.arg(dest);
    cmd.env("GIT_TERMINAL_PROMPT", "0");

    let output = cmd
        .output()
        .with_context(|| "Failed to execute 'git clone'. Is git installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git clone failed: {}", stderr.trim());
    }

    Ok(())
}
