//! Retrieval-augmented answers over the combined index.
//!
//! A code question is embedded, the top-K chunks are retrieved, grouped by
//! repository in first-appearance order, and rendered into a single prompt
//! for the chat model. General questions go to the model unchanged.

use anyhow::Result;
use tracing::info;

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingProvider;
use crate::index::VectorIndex;
use crate::llm::ChatModel;
use crate::models::{Document, ScoredDocument};

/// Characters of the first line shown per snippet in the prompt.
pub const PREVIEW_CHARS: usize = 80;

/// Index, embedder and K bundled for plain similarity lookups.
pub struct Retriever<'a> {
    index: &'a VectorIndex,
    embedder: &'a dyn EmbeddingProvider,
    k: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a VectorIndex, embedder: &'a dyn EmbeddingProvider, k: usize) -> Self {
        Self { index, embedder, k }
    }

    /// Retriever using `retrieval.default_k`.
    pub fn from_config(
        index: &'a VectorIndex,
        embedder: &'a dyn EmbeddingProvider,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self::new(index, embedder, retrieval.default_k)
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredDocument>> {
        self.index.similarity_search(query, self.k, self.embedder).await
    }
}

/// Group documents by repository. Groups appear in the order their first
/// document does; documents keep their relative order within a group.
pub fn group_by_repository(documents: &[Document]) -> Vec<(&str, Vec<&Document>)> {
    let mut groups: Vec<(&str, Vec<&Document>)> = Vec::new();
    for doc in documents {
        let repo = doc.metadata.repository_id.as_str();
        match groups.iter_mut().find(|(name, _)| *name == repo) {
            Some((_, docs)) => docs.push(doc),
            None => groups.push((repo, vec![doc])),
        }
    }
    groups
}

pub fn build_code_prompt(query: &str, groups: &[(&str, Vec<&Document>)]) -> String {
    let mut lines = Vec::new();
    for (repo, docs) in groups {
        lines.push(format!("\n **{}**", repo));
        for doc in docs {
            lines.push(format!(
                "- `{}`: {}...",
                doc.metadata.file_path,
                doc.preview(PREVIEW_CHARS)
            ));
        }
    }
    let context = lines.join("\n");

    format!(
        "The user asked: \"{}\"\nHere are relevant code snippets grouped by repository:\n{}\n\nAnswer the question in a helpful, structured way.",
        query, context
    )
}

/// Answer a code question from the chunks `retriever` finds for it.
pub async fn answer_code_query(
    query: &str,
    retriever: &Retriever<'_>,
    model: &dyn ChatModel,
) -> Result<String> {
    let hits = retriever.retrieve(query).await?;
    info!(hits = hits.len(), k = retriever.k, "retrieved code snippets");

    let documents: Vec<Document> = hits.into_iter().map(|hit| hit.document).collect();
    let groups = group_by_repository(&documents);
    let prompt = build_code_prompt(query, &groups);

    let reply = model.complete(&prompt).await?;
    Ok(reply.trim().to_string())
}

/// Forward a non-code question to the model as-is.
pub async fn answer_general(query: &str, model: &dyn ChatModel) -> Result<String> {
    let reply = model.complete(query).await?;
    Ok(reply.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LetterEmbedder, ScriptedChat};

    fn doc(content: &str, repo: &str, path: &str) -> Document {
        Document::new(content, repo, path)
    }

    fn index_of(docs: Vec<Document>) -> VectorIndex {
        let vectors = docs.iter().map(|d| LetterEmbedder::vectorize(&d.content)).collect();
        VectorIndex::from_embeddings("combined", "test/letters", docs, vectors).unwrap()
    }

    #[test]
    fn test_group_first_appearance_order() {
        let docs = vec![
            doc("a1", "flask", "/f/app.py"),
            doc("b1", "requests", "/r/api.py"),
            doc("a2", "flask", "/f/views.py"),
        ];
        let groups = group_by_repository(&docs);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "flask");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[0].1[1].content, "a2");
        assert_eq!(groups[1].0, "requests");
    }

    #[test]
    fn test_prompt_format() {
        let docs = vec![
            doc("\n  def get(url):\n    pass", "requests", "/r/api.py"),
            doc("class Flask:", "flask", "/f/app.py"),
        ];
        let groups = group_by_repository(&docs);
        let prompt = build_code_prompt("How do I GET?", &groups);

        let expected = "The user asked: \"How do I GET?\"\n\
Here are relevant code snippets grouped by repository:\n\
\n **requests**\n\
- `/r/api.py`: def get(url):...\n\
\n **flask**\n\
- `/f/app.py`: class Flask:...\n\
\n\
Answer the question in a helpful, structured way.";
        assert_eq!(prompt, expected);
    }

    #[test]
    fn test_prompt_preview_truncated() {
        let long = "x".repeat(200);
        let docs = vec![doc(&long, "repo", "/a.py")];
        let prompt = build_code_prompt("q", &group_by_repository(&docs));
        assert!(prompt.contains(&format!("- `/a.py`: {}...\n", "x".repeat(80))));
        assert!(!prompt.contains(&"x".repeat(81)));
    }

    #[tokio::test]
    async fn test_answer_code_query_trims_reply() {
        let index = index_of(vec![
            doc("session cookies", "requests", "/r/sessions.py"),
            doc("zzz", "other", "/o/z.py"),
        ]);
        let embedder = LetterEmbedder::new();
        let model = ScriptedChat::new(&["  Sessions persist cookies.\n"]);

        let retriever = Retriever::new(&index, &embedder, 1);
        let answer = answer_code_query("session cookies", &retriever, &model)
            .await
            .unwrap();
        assert_eq!(answer, "Sessions persist cookies.");

        let prompts = model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains(" **requests**"));
        assert!(!prompts[0].contains("**other**"));
    }

    #[tokio::test]
    async fn test_retriever_default_k() {
        let index = index_of(vec![
            doc("one", "r", "/1.py"),
            doc("two", "r", "/2.py"),
            doc("three", "r", "/3.py"),
            doc("four", "r", "/4.py"),
        ]);
        let embedder = LetterEmbedder::new();
        let hits = Retriever::from_config(&index, &embedder, &RetrievalConfig::default())
            .retrieve("one")
            .await
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].document.content, "one");
    }

    #[tokio::test]
    async fn test_answer_general_passes_query_through() {
        let model = ScriptedChat::new(&["Hello! "]);
        let answer = answer_general("Hello bot", &model).await.unwrap();
        assert_eq!(answer, "Hello!");
        assert_eq!(model.prompts(), vec!["Hello bot".to_string()]);
    }
}
