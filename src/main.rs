//! # repo-qa CLI
//!
//! ```bash
//! repo-qa                              # built-in defaults (Ollama + local embeddings)
//! repo-qa --config ./config/repo-qa.toml
//! RUST_LOG=repo_qa=info repo-qa        # show pipeline progress on stderr
//! ```
//!
//! The binary prompts for comma-separated repository URLs, indexes them,
//! then answers questions until `exit` or end of input.

use anyhow::Result;
use clap::Parser;
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use repo_qa::config;
use repo_qa::embedding::create_provider;
use repo_qa::fetch::GitCli;
use repo_qa::llm::shared_chat_model;
use repo_qa::session;

/// Chat with the source code of GitHub repositories.
#[derive(Parser)]
#[command(name = "repo-qa", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Built-in defaults are used when
    /// omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(cli.config.as_deref())?;
    info!(llm = %cfg.llm.provider, embedding = %cfg.embedding.provider, "configuration loaded");

    let embedder = create_provider(&cfg.embedding)?;
    let model = shared_chat_model(&cfg.llm)?;
    let fetcher = GitCli {
        shallow: cfg.fetch.shallow,
    };

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut stdout = io::stdout();

    let urls = session::read_repo_urls(&mut input, &mut stdout)?;
    let indices =
        session::process_repositories(&urls, &fetcher, &cfg, embedder.as_ref(), &mut stdout).await?;
    let combined = session::combine(indices)?;

    session::run_interactive(
        &mut input,
        &mut stdout,
        &combined,
        embedder.as_ref(),
        model.as_ref(),
        &cfg.retrieval,
    )
    .await
}
