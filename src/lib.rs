//! # repo-qa
//!
//! Ask questions about one or more GitHub repositories from the terminal.
//!
//! repo-qa clones each repository into a temporary directory, loads its
//! Python sources, splits them into overlapping chunks, embeds them into a
//! per-repository vector index persisted on disk, and merges the indices
//! into a single session-wide index. Each question is first classified by
//! the chat model: code questions are answered from retrieved snippets,
//! everything else is passed to the model directly.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌────────┐   ┌─────────┐   ┌───────────┐
//! │  fetch  │──▶│ loader │──▶│  chunk  │──▶│   index   │
//! │ git CLI │   │ *.py   │   │ 800/150 │   │ per repo  │
//! └─────────┘   └────────┘   └─────────┘   └─────┬─────┘
//!                                                │ merge
//!                     ┌────────────┐       ┌─────▼─────┐
//!      question ────▶ │ classifier │──yes─▶│ responder │──▶ answer
//!                     └─────┬──────┘       └───────────┘
//!                           └──no──▶ llm ─────────────────▶ answer
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Documents, metadata, scored hits |
//! | [`fetch`] | Repository identifiers and temporary clones |
//! | [`loader`] | Source-file discovery and reading |
//! | [`chunk`] | Recursive character text splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Persisted vector indices and merging |
//! | [`llm`] | Chat model clients |
//! | [`classifier`] | Code/non-code question routing |
//! | [`responder`] | Retrieval-augmented answers |
//! | [`session`] | Repository processing and the interactive loop |

pub mod chunk;
pub mod classifier;
pub mod config;
pub mod embedding;
pub mod fetch;
pub mod index;
pub mod llm;
pub mod loader;
pub mod models;
pub mod responder;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;
