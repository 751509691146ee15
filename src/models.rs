//! Core data models used throughout repo-qa.
//!
//! These types represent the documents and chunks that flow through the
//! load → chunk → index → retrieve pipeline.

use serde::{Deserialize, Serialize};

/// Provenance attached to every document and chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Short repository identifier (e.g. `requests`).
    pub repository_id: String,
    /// Path of the source file inside the working copy.
    pub file_path: String,
    /// Unique chunk identifier, assigned when a chunk is indexed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
}

/// A piece of text plus its provenance.
///
/// The loader produces one per file; the chunker produces one per chunk,
/// copying the parent's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(
        content: impl Into<String>,
        repository_id: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            metadata: DocumentMetadata {
                repository_id: repository_id.into(),
                file_path: file_path.into(),
                doc_id: None,
            },
        }
    }

    /// First line of the trimmed content, cut to `max_chars` characters.
    pub fn preview(&self, max_chars: usize) -> String {
        self.content
            .trim()
            .split('\n')
            .next()
            .unwrap_or_default()
            .chars()
            .take(max_chars)
            .collect()
    }
}

/// A document returned from similarity search, with its cosine score.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_takes_first_line() {
        let doc = Document::new("\n  print('hello')\nsecond line", "repoA", "/a.py");
        assert_eq!(doc.preview(80), "print('hello')");
    }

    #[test]
    fn test_preview_truncates_by_chars() {
        let doc = Document::new("é".repeat(100), "repoA", "/a.py");
        assert_eq!(doc.preview(80).chars().count(), 80);
    }

    #[test]
    fn test_doc_id_omitted_when_unset() {
        let doc = Document::new("x", "r", "f");
        let json = serde_json::to_string(&doc).unwrap();
        assert!(!json.contains("doc_id"));
    }
}
