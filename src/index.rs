//! Per-repository vector index.
//!
//! A [`VectorIndex`] is a flat list of chunk documents and their embedding
//! vectors, searched by brute-force cosine similarity. Each index is
//! persisted under `<root>/<repository_id>/` as two files:
//!
//! | File | Contents |
//! |------|----------|
//! | `index.json` | manifest: format version, embedding model, dims, entry count, documents |
//! | `index.vec` | all vectors, little-endian `f32`, row-major |
//!
//! The embedding model identifier is stored in the manifest and checked on
//! load so an index is never queried with vectors from a different model.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};
use crate::models::{Document, ScoredDocument};

pub const MANIFEST_FILE: &str = "index.json";
pub const VECTORS_FILE: &str = "index.vec";

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("No chunks to index for {repository}!")]
    EmptyChunks { repository: String },

    #[error("No vectorstores available!")]
    NoIndices,

    #[error(
        "Index '{repository}' was built with embedding model '{stored}' but the active model is '{active}'; delete the index directory to rebuild it"
    )]
    ModelMismatch {
        repository: String,
        stored: String,
        active: String,
    },

    #[error("Cannot merge index '{other}' into '{primary}': {reason}")]
    Incompatible {
        primary: String,
        other: String,
        reason: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    name: String,
    embedding_model: String,
    dims: usize,
    entries: usize,
    created_at: DateTime<Utc>,
    documents: Vec<Document>,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    name: String,
    embedding_model: String,
    dims: usize,
    documents: Vec<Document>,
    vectors: Vec<Vec<f32>>,
}

impl VectorIndex {
    /// Assemble an index from documents and their precomputed vectors.
    pub fn from_embeddings(
        name: &str,
        embedding_model: &str,
        documents: Vec<Document>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if documents.len() != vectors.len() {
            bail!(
                "Index '{}': {} documents but {} vectors",
                name,
                documents.len(),
                vectors.len()
            );
        }
        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        if vectors.iter().any(|v| v.len() != dims) {
            bail!("Index '{}': vectors have inconsistent dimensions", name);
        }

        Ok(Self {
            name: name.to_string(),
            embedding_model: embedding_model.to_string(),
            dims,
            documents,
            vectors,
        })
    }

    /// Embed every document's content and build an index over them.
    pub async fn from_documents(
        name: &str,
        documents: Vec<Document>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let vectors = embedder
            .embed(&texts)
            .await
            .with_context(|| format!("Failed to embed chunks for {}", name))?;
        Self::from_embeddings(name, &embedder.model_id(), documents, vectors)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    /// Append all entries of `other`, in order. No de-duplication.
    pub fn merge_from(&mut self, other: VectorIndex) -> Result<()> {
        if other.embedding_model != self.embedding_model {
            return Err(IndexError::Incompatible {
                primary: self.name.clone(),
                other: other.name,
                reason: format!(
                    "embedding model '{}' differs from '{}'",
                    other.embedding_model, self.embedding_model
                ),
            }
            .into());
        }
        if !self.is_empty() && !other.is_empty() && other.dims != self.dims {
            return Err(IndexError::Incompatible {
                primary: self.name.clone(),
                other: other.name,
                reason: format!("dimension {} differs from {}", other.dims, self.dims),
            }
            .into());
        }

        if self.is_empty() {
            self.dims = other.dims;
        }
        self.documents.extend(other.documents);
        self.vectors.extend(other.vectors);
        Ok(())
    }

    /// Top `k` documents by cosine similarity to `query`, best first.
    /// Equal scores keep insertion order.
    pub fn search_by_vector(&self, query: &[f32], k: usize) -> Vec<ScoredDocument> {
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, cosine_similarity(query, v)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        scored
            .into_iter()
            .map(|(i, score)| ScoredDocument {
                document: self.documents[i].clone(),
                score,
            })
            .collect()
    }

    /// Embed `query` and return the `k` most similar documents.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Vec<ScoredDocument>> {
        let query_vec = embedder.embed_query(query).await?;
        Ok(self.search_by_vector(&query_vec, k))
    }

    /// Write the vector and manifest files into `dir`, creating it if needed.
    ///
    /// The manifest is written last and renamed into place, so a directory
    /// without `index.json` never holds a complete index.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;

        let manifest_path = dir.join(MANIFEST_FILE);
        if manifest_path.exists() {
            std::fs::remove_file(&manifest_path).context("Failed to remove old index manifest")?;
        }

        let mut blob = Vec::with_capacity(self.vectors.len() * self.dims * 4);
        for v in &self.vectors {
            blob.extend_from_slice(&vec_to_blob(v));
        }
        std::fs::write(dir.join(VECTORS_FILE), blob).context("Failed to write index vectors")?;

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            name: self.name.clone(),
            embedding_model: self.embedding_model.clone(),
            dims: self.dims,
            entries: self.documents.len(),
            created_at: Utc::now(),
            documents: self.documents.clone(),
        };
        let json = serde_json::to_string(&manifest).context("Failed to serialize index manifest")?;
        let staged = dir.join(format!("{}.tmp", MANIFEST_FILE));
        std::fs::write(&staged, json).context("Failed to write index manifest")?;
        std::fs::rename(&staged, &manifest_path).context("Failed to commit index manifest")?;

        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let manifest_path = dir.join(MANIFEST_FILE);
        let json = std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("Failed to read index manifest: {}", manifest_path.display()))?;
        let manifest: Manifest =
            serde_json::from_str(&json).context("Failed to parse index manifest")?;

        if manifest.format_version != FORMAT_VERSION {
            bail!(
                "Unsupported index format version {} in {}",
                manifest.format_version,
                dir.display()
            );
        }

        if manifest.entries != manifest.documents.len() {
            bail!(
                "Corrupt index in {}: manifest lists {} entries but holds {} documents",
                dir.display(),
                manifest.entries,
                manifest.documents.len()
            );
        }

        let blob = std::fs::read(dir.join(VECTORS_FILE)).context("Failed to read index vectors")?;
        let expected = manifest.documents.len() * manifest.dims * 4;
        if blob.len() != expected {
            bail!(
                "Corrupt index in {}: expected {} bytes of vectors, found {}",
                dir.display(),
                expected,
                blob.len()
            );
        }

        let vectors: Vec<Vec<f32>> = if manifest.dims == 0 {
            vec![Vec::new(); manifest.documents.len()]
        } else {
            blob.chunks_exact(manifest.dims * 4).map(blob_to_vec).collect()
        };

        Self::from_embeddings(
            &manifest.name,
            &manifest.embedding_model,
            manifest.documents,
            vectors,
        )
    }
}

/// Persisted indices, one directory per repository identifier.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, repository_id: &str) -> PathBuf {
        self.root.join(repository_id)
    }

    /// Load the persisted index for `repository_id`, or build, persist and
    /// return a new one from `chunks`.
    ///
    /// When building, each chunk gets a `doc_id` of the form
    /// `<repository_id>_<position>_<uuid>`.
    pub async fn get_or_build(
        &self,
        chunks: Vec<Document>,
        repository_id: &str,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<VectorIndex> {
        check_repository_id(repository_id)?;
        let path = self.path_for(repository_id);

        if path.join(MANIFEST_FILE).exists() {
            info!(repository = repository_id, path = %path.display(), "loading existing index");
            let index = VectorIndex::load(&path)
                .with_context(|| format!("Failed to load index for {}", repository_id))?;

            let active = embedder.model_id();
            if index.embedding_model() != active {
                return Err(IndexError::ModelMismatch {
                    repository: repository_id.to_string(),
                    stored: index.embedding_model().to_string(),
                    active,
                }
                .into());
            }
            return Ok(index);
        }

        info!(repository = repository_id, chunks = chunks.len(), "creating new index");
        if chunks.is_empty() {
            return Err(IndexError::EmptyChunks {
                repository: repository_id.to_string(),
            }
            .into());
        }

        let mut chunks = chunks;
        for (i, chunk) in chunks.iter_mut().enumerate() {
            chunk.metadata.doc_id = Some(format!("{}_{}_{}", repository_id, i, Uuid::new_v4()));
        }

        let index = VectorIndex::from_documents(repository_id, chunks, embedder).await?;
        index.save(&path)?;
        Ok(index)
    }
}

/// Fold every index after the first into the first, in order.
pub fn merge_indices(indices: Vec<VectorIndex>) -> Result<VectorIndex> {
    let mut iter = indices.into_iter();
    let mut combined = iter.next().ok_or(IndexError::NoIndices)?;
    for index in iter {
        combined.merge_from(index)?;
    }
    Ok(combined)
}

fn check_repository_id(repository_id: &str) -> Result<()> {
    if repository_id.is_empty()
        || repository_id == "."
        || repository_id == ".."
        || repository_id.contains(['/', '\\'])
    {
        bail!("Invalid repository identifier for an index directory: '{}'", repository_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::LetterEmbedder;
    use tempfile::TempDir;

    fn chunk(text: &str, repo: &str, file: &str) -> Document {
        Document::new(text, repo, file)
    }

    fn index_of(name: &str, texts: &[&str]) -> VectorIndex {
        let docs: Vec<Document> = texts.iter().map(|t| chunk(t, name, "f.py")).collect();
        let vectors = texts.iter().map(|t| LetterEmbedder::vectorize(t)).collect();
        VectorIndex::from_embeddings(name, "test/letters", docs, vectors).unwrap()
    }

    #[tokio::test]
    async fn test_build_with_no_chunks_fails() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let embedder = LetterEmbedder::new();

        let err = store
            .get_or_build(Vec::new(), "requests", &embedder)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No chunks to index for requests!");
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::EmptyChunks { .. })
        ));
        assert!(!store.path_for("requests").exists());
    }

    #[tokio::test]
    async fn test_build_persists_and_reloads() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path().join("vectorstores"));
        let embedder = LetterEmbedder::new();
        let chunks = vec![
            chunk("def get(url): pass", "requests", "/r/api.py"),
            chunk("class Session: pass", "requests", "/r/sessions.py"),
        ];

        let built = store.get_or_build(chunks, "requests", &embedder).await.unwrap();
        assert_eq!(built.len(), 2);
        let dir = store.path_for("requests");
        assert!(dir.join(MANIFEST_FILE).exists());
        assert!(dir.join(VECTORS_FILE).exists());

        for (i, doc) in built.documents().iter().enumerate() {
            let id = doc.metadata.doc_id.as_deref().unwrap();
            assert!(id.starts_with(&format!("requests_{}_", i)));
        }

        let calls_after_build = embedder.calls();
        let loaded = store.get_or_build(Vec::new(), "requests", &embedder).await.unwrap();
        assert_eq!(embedder.calls(), calls_after_build);
        assert_eq!(loaded.documents(), built.documents());
        assert_eq!(loaded.vectors, built.vectors);
        assert_eq!(loaded.embedding_model(), "test/letters");
    }

    #[tokio::test]
    async fn test_load_with_other_model_fails() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        store
            .get_or_build(vec![chunk("x = 1", "demo", "a.py")], "demo", &LetterEmbedder::new())
            .await
            .unwrap();

        let other = LetterEmbedder::with_model("other-model");
        let err = store.get_or_build(Vec::new(), "demo", &other).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::ModelMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_path_like_identifiers() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let embedder = LetterEmbedder::new();
        for bad in ["..", ".", "a/b", ""] {
            assert!(store
                .get_or_build(vec![chunk("x", bad, "f")], bad, &embedder)
                .await
                .is_err());
        }
    }

    #[test]
    fn test_corrupt_vectors_detected() {
        let tmp = TempDir::new().unwrap();
        let index = index_of("demo", &["alpha", "beta"]);
        index.save(tmp.path()).unwrap();
        std::fs::write(tmp.path().join(VECTORS_FILE), [0u8; 7]).unwrap();
        let err = VectorIndex::load(tmp.path()).unwrap_err();
        assert!(err.to_string().contains("Corrupt index"));
    }

    #[test]
    fn test_merge_empty_list_fails() {
        let err = merge_indices(Vec::new()).unwrap_err();
        assert_eq!(err.to_string(), "No vectorstores available!");
    }

    #[test]
    fn test_merge_appends_in_order() {
        let a = index_of("a", &["aaa"]);
        let b = index_of("b", &["bbb", "bcb"]);
        let c = index_of("c", &["ccc"]);

        let combined = merge_indices(vec![a, b, c]).unwrap();
        assert_eq!(combined.name(), "a");
        let contents: Vec<&str> = combined
            .documents()
            .iter()
            .map(|d| d.content.as_str())
            .collect();
        assert_eq!(contents, vec!["aaa", "bbb", "bcb", "ccc"]);
        assert_eq!(combined.vectors.len(), 4);
    }

    #[test]
    fn test_merge_keeps_duplicates() {
        let combined = merge_indices(vec![index_of("a", &["same"]), index_of("b", &["same"])]).unwrap();
        assert_eq!(combined.len(), 2);
    }

    #[test]
    fn test_merge_rejects_different_models() {
        let mut a = index_of("a", &["aaa"]);
        let b = VectorIndex::from_embeddings(
            "b",
            "other/model",
            vec![chunk("b", "b", "f")],
            vec![vec![1.0; 27]],
        )
        .unwrap();
        assert!(a.merge_from(b).is_err());
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let index = index_of("demo", &["zzzz", "abc abc", "xyz"]);
        let results = index.search_by_vector(&LetterEmbedder::vectorize("abcabc"), 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].document.content, "abc abc");
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let index = index_of("demo", &["one", "two"]);
        assert_eq!(index.search_by_vector(&LetterEmbedder::vectorize("one"), 12).len(), 2);
    }

    #[test]
    fn test_search_ties_keep_insertion_order() {
        let index = index_of("demo", &["same", "same", "same"]);
        let docs: Vec<Document> = index.documents().to_vec();
        let results = index.search_by_vector(&LetterEmbedder::vectorize("same"), 3);
        for (r, d) in results.iter().zip(docs.iter()) {
            assert_eq!(&r.document, d);
        }
    }

    #[test]
    fn test_search_with_nan_vectors() {
        let docs: Vec<Document> = (0..40).map(|i| chunk(&format!("c{}", i), "demo", "f.py")).collect();
        let vectors: Vec<Vec<f32>> = (0..40)
            .map(|i| {
                if i % 3 == 0 {
                    vec![f32::NAN, 1.0]
                } else {
                    vec![1.0, i as f32 / 40.0]
                }
            })
            .collect();
        let index = VectorIndex::from_embeddings("demo", "m", docs, vectors).unwrap();

        let results = index.search_by_vector(&[1.0, 0.0], 5);
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].document.content, "c1");
        assert!(results.iter().all(|r| r.score.is_finite() && r.score > 0.0));
    }

    #[tokio::test]
    async fn test_empty_directory_is_rebuilt() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        std::fs::create_dir_all(store.path_for("requests")).unwrap();

        let index = store
            .get_or_build(vec![chunk("import json", "requests", "a.py")], "requests", &LetterEmbedder::new())
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
        assert!(store.path_for("requests").join(MANIFEST_FILE).exists());
    }

    #[tokio::test]
    async fn test_vectors_without_manifest_are_rebuilt() {
        let tmp = TempDir::new().unwrap();
        let store = IndexStore::new(tmp.path());
        let dir = store.path_for("demo");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(VECTORS_FILE), [0u8; 13]).unwrap();

        let embedder = LetterEmbedder::new();
        let built = store
            .get_or_build(vec![chunk("abc", "demo", "a.py"), chunk("xyz", "demo", "b.py")], "demo", &embedder)
            .await
            .unwrap();
        let loaded = VectorIndex::load(&dir).unwrap();
        assert_eq!(loaded.vectors, built.vectors);
        assert!(!dir.join(format!("{}.tmp", MANIFEST_FILE)).exists());
    }

    #[test]
    fn test_mismatched_lengths_rejected() {
        assert!(VectorIndex::from_embeddings("x", "m", vec![chunk("a", "x", "f")], vec![]).is_err());
        assert!(VectorIndex::from_embeddings(
            "x",
            "m",
            vec![chunk("a", "x", "f"), chunk("b", "x", "f")],
            vec![vec![1.0], vec![1.0, 2.0]]
        )
        .is_err());
    }
}
