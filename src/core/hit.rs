//! Retrieval hits: a chunk surfaced by a retriever with its scores.
//!
//! Hits keep enough provenance (file, ordinal, per-retriever scores and
//! ranks) for the hybrid fusion step to apply its tie-breaks and for the
//! verifier to ground citations.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Which retriever produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalSource {
    /// Lexical Okapi-BM25 retrieval.
    Bm25,
    /// Dense-vector cosine retrieval.
    Vector,
    /// Reciprocal-rank-fused result.
    Hybrid,
}

/// A single chunk returned by a retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalHit {
    /// Globally unique chunk identifier within the namespace:
    /// `{file_id}#chunk#{ordinal}`.
    pub chunk_id: String,
    /// Chunk text.
    pub text: String,
    /// 1-based page number. BM25 bundles carry no page metadata, so BM25
    /// hits use `ordinal + 1` as a pseudo-page.
    pub page_number: u32,
    /// Source document identifier.
    pub file_id: String,
    /// 0-based position of the chunk within its file.
    pub ordinal: usize,
    /// Primary score in the producing retriever's scale.
    pub score: f64,
    /// 1-based rank within the result list that surfaced this hit.
    pub rank: usize,
    /// Producing retriever.
    pub source: RetrievalSource,
    /// Okapi-BM25 score, when lexical retrieval saw this chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bm25_score: Option<f64>,
    /// Cosine similarity, when vector retrieval saw this chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f32>,
    /// 1-based rank in the BM25 list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bm25_rank: Option<usize>,
    /// 1-based rank in the vector list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_rank: Option<usize>,
    /// Fused reciprocal-rank score, for hybrid hits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrf_score: Option<f64>,
    /// Set by the navigator when the chunk looks truncated and the
    /// surrounding logic may want to fetch neighbor chunks.
    #[serde(default)]
    pub needs_expansion: bool,
}

impl RetrievalHit {
    /// Returns a grapheme-safe prefix of the chunk text.
    ///
    /// Used when formatting chunks into prompts, where budgets are in
    /// characters rather than bytes.
    #[must_use]
    pub fn preview(&self, max_graphemes: usize) -> String {
        self.text.graphemes(true).take(max_graphemes).collect()
    }

    /// Approximate token count of the chunk text, for budgeting.
    #[must_use]
    pub fn token_estimate(&self) -> usize {
        crate::gateway::count_tokens_approx(&self.text)
    }
}

/// Formats the canonical chunk identifier for a file and ordinal.
#[must_use]
pub fn chunk_id(file_id: &str, ordinal: usize) -> String {
    format!("{file_id}#chunk#{ordinal}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str) -> RetrievalHit {
        RetrievalHit {
            chunk_id: chunk_id("f1", 0),
            text: text.to_string(),
            page_number: 1,
            file_id: "f1".to_string(),
            ordinal: 0,
            score: 1.0,
            rank: 1,
            source: RetrievalSource::Bm25,
            bm25_score: Some(1.0),
            vector_score: None,
            bm25_rank: Some(1),
            vector_rank: None,
            rrf_score: None,
            needs_expansion: false,
        }
    }

    #[test]
    fn test_chunk_id_format() {
        assert_eq!(chunk_id("report", 3), "report#chunk#3");
    }

    #[test]
    fn test_preview_ascii() {
        let h = hit("hello world");
        assert_eq!(h.preview(5), "hello");
        assert_eq!(h.preview(100), "hello world");
    }

    #[test]
    fn test_preview_cjk_boundary() {
        let h = hit("预算三千元");
        assert_eq!(h.preview(2), "预算");
    }

    #[test]
    fn test_hit_serialization_omits_empty() {
        let h = hit("text");
        let json = serde_json::to_string(&h).unwrap();
        assert!(json.contains("\"source\":\"bm25\""));
        assert!(!json.contains("vector_score"));
        assert!(!json.contains("rrf_score"));
    }

    #[test]
    fn test_source_serialization() {
        let json = serde_json::to_string(&RetrievalSource::Hybrid).unwrap();
        assert_eq!(json, "\"hybrid\"");
    }
}
