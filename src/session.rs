//! The interactive question-answering session.
//!
//! ```text
//! COLLECT_URLS ─▶ PROCESS_REPOS ─▶ COMBINE_INDICES ─▶ READY ⟲ ─▶ EXIT
//! ```
//!
//! Every step before `READY` is fatal on error. In `READY` each line is a
//! question: a line that is exactly `exit` (any case) or end of input stops
//! the loop. Anything else is trimmed, classified and answered either
//! directly or from the combined index.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, Write};
use tracing::{debug, info};

use crate::chunk::TextSplitter;
use crate::classifier::is_code_related;
use crate::config::{Config, RetrievalConfig};
use crate::embedding::EmbeddingProvider;
use crate::fetch::{clone_repos, RepoFetcher};
use crate::index::{merge_indices, IndexStore, VectorIndex};
use crate::llm::ChatModel;
use crate::loader::load_documents;
use crate::responder::{answer_code_query, answer_general, Retriever};

pub const URL_PROMPT: &str = "Enter GitHub repo URLs (comma separated): ";

/// Split a comma-separated line into trimmed, non-empty URLs.
pub fn parse_repo_urls(line: &str) -> Vec<String> {
    line.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Prompt for repository URLs and read one line of them.
pub fn read_repo_urls<R: BufRead, W: Write>(mut input: R, output: &mut W) -> Result<Vec<String>> {
    write!(output, "{}", URL_PROMPT)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line).context("Failed to read repository URLs")?;

    let urls = parse_repo_urls(&line);
    if urls.is_empty() {
        bail!("No repository URLs provided");
    }
    Ok(urls)
}

/// Clone, load, chunk and index every repository, in input order.
///
/// Any failure aborts the whole batch. Working copies are removed when
/// this returns.
pub async fn process_repositories<W: Write>(
    urls: &[String],
    fetcher: &dyn RepoFetcher,
    config: &Config,
    embedder: &dyn EmbeddingProvider,
    output: &mut W,
) -> Result<Vec<VectorIndex>> {
    if urls.is_empty() {
        bail!("No repository URLs provided");
    }

    let splitter = TextSplitter::from_config(&config.chunking)?;
    let store = IndexStore::new(config.index.root.clone());
    let repos = clone_repos(urls, fetcher)?;

    let mut indices = Vec::with_capacity(repos.len());
    for repo in &repos {
        writeln!(output, "\nProcessing {}...", repo.id)?;
        output.flush()?;

        let report = load_documents(&repo.id, repo.path(), &config.loader)?;
        for skipped in &report.skipped {
            debug!(repository = %repo.id, path = %skipped.path.display(), reason = %skipped.reason, "skipped file");
        }

        let chunks = splitter.split_documents(&report.documents);
        info!(
            repository = %repo.id,
            files = report.documents.len(),
            skipped = report.skipped.len(),
            chunks = chunks.len(),
            "prepared repository"
        );

        let index = store.get_or_build(chunks, &repo.id, embedder).await?;
        indices.push(index);
    }

    Ok(indices)
}

/// Merge per-repository indices into one session-wide index.
pub fn combine(indices: Vec<VectorIndex>) -> Result<VectorIndex> {
    let combined = merge_indices(indices)?;
    info!(entries = combined.len(), "combined index ready");
    Ok(combined)
}

/// Answer questions from `input` until `exit` or end of input.
pub async fn run_interactive<R: BufRead, W: Write>(
    mut input: R,
    output: &mut W,
    index: &VectorIndex,
    embedder: &dyn EmbeddingProvider,
    model: &dyn ChatModel,
    retrieval: &RetrievalConfig,
) -> Result<()> {
    writeln!(
        output,
        "\nAsk questions about the code across all repos or general programming (type 'exit' to quit):"
    )?;

    let retriever = Retriever::new(index, embedder, retrieval.code_query_k);
    loop {
        write!(output, "\nYou: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let raw = line.trim_end_matches(['\r', '\n']);
        if raw.eq_ignore_ascii_case("exit") {
            break;
        }
        let query = raw.trim();
        if query.is_empty() {
            continue;
        }

        let answer = if is_code_related(model, query).await? {
            answer_code_query(query, &retriever, model).await?
        } else {
            answer_general(query, model).await?
        };
        writeln!(output, "\nBot: {}", answer)?;
    }

    Ok(())
}
