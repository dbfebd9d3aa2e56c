//! Lexical retrieval across all loaded BM25 indices in a namespace.

use tracing::debug;

use crate::core::{RetrievalHit, RetrievalSource, chunk_id};
use crate::index::{NamespaceIndexes, tokenize};

/// Returns the top-`k` chunks across all files by Okapi-BM25 score.
///
/// Chunks scoring `<= 0` are dropped. Ties sort by lower `file_id`
/// lexicographically, then lower ordinal. No loaded indices or an empty
/// token stream yields an empty result, not an error.
#[must_use]
pub fn search(indexes: &NamespaceIndexes, query: &str, k: usize) -> Vec<RetrievalHit> {
    if indexes.bm25.is_empty() || k == 0 {
        return Vec::new();
    }

    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        debug!("query tokenized to nothing, skipping BM25");
        return Vec::new();
    }

    let mut hits = Vec::new();
    for (file_id, file) in &indexes.bm25 {
        let scores = file.index.scores(&query_tokens);
        for (ordinal, score) in scores.into_iter().enumerate() {
            if score <= 0.0 {
                continue;
            }
            let Some(text) = file.chunks.get(ordinal) else {
                continue;
            };
            #[allow(clippy::cast_possible_truncation)]
            hits.push(RetrievalHit {
                chunk_id: chunk_id(file_id, ordinal),
                text: text.clone(),
                // BM25 bundles carry no page metadata; ordinal + 1 is the
                // documented pseudo-page.
                page_number: (ordinal + 1) as u32,
                file_id: file_id.clone(),
                ordinal,
                score,
                rank: 0,
                source: RetrievalSource::Bm25,
                bm25_score: Some(score),
                vector_score: None,
                bm25_rank: None,
                vector_rank: None,
                rrf_score: None,
                needs_expansion: false,
            });
        }
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.file_id.cmp(&b.file_id))
            .then_with(|| a.ordinal.cmp(&b.ordinal))
    });
    hits.truncate(k);
    for (i, hit) in hits.iter_mut().enumerate() {
        hit.rank = i + 1;
        hit.bm25_rank = Some(i + 1);
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Bm25File, Bm25Index};

    fn indexes_with(files: &[(&str, &[&str])]) -> NamespaceIndexes {
        let mut indexes = NamespaceIndexes::default();
        for (file_id, texts) in files {
            let chunks: Vec<String> = texts.iter().map(|s| (*s).to_string()).collect();
            indexes.bm25.insert(
                (*file_id).to_string(),
                Bm25File {
                    index: Bm25Index::build(&chunks),
                    chunks,
                },
            );
        }
        indexes
    }

    #[test]
    fn test_search_empty_namespace() {
        let indexes = NamespaceIndexes::default();
        assert!(search(&indexes, "anything", 5).is_empty());
    }

    #[test]
    fn test_search_ranks_and_pseudo_pages() {
        let indexes = indexes_with(&[(
            "f1",
            &["deadline is march", "budget is high", "deadline deadline"],
        )]);
        let hits = search(&indexes, "deadline", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].ordinal, 2);
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[0].page_number, 3);
        assert_eq!(hits[1].ordinal, 0);
        assert_eq!(hits[1].chunk_id, "f1#chunk#0");
    }

    #[test]
    fn test_search_merges_across_files_with_tie_break() {
        // Identical texts in two files produce identical scores; the tie
        // goes to the lexicographically lower file_id, then lower ordinal.
        let indexes = indexes_with(&[
            ("zeta", &["deadline clause", "deadline clause"]),
            ("alpha", &["deadline clause", "deadline clause"]),
        ]);
        let hits = search(&indexes, "deadline", 10);
        assert_eq!(hits.len(), 4);
        assert_eq!(hits[0].file_id, "alpha");
        assert_eq!(hits[0].ordinal, 0);
        assert_eq!(hits[1].file_id, "alpha");
        assert_eq!(hits[1].ordinal, 1);
        assert_eq!(hits[2].file_id, "zeta");
    }

    #[test]
    fn test_search_drops_zero_scores() {
        let indexes = indexes_with(&[("f1", &["nothing relevant here"])]);
        assert!(search(&indexes, "deadline", 10).is_empty());
    }

    #[test]
    fn test_search_truncates_to_k() {
        let indexes = indexes_with(&[(
            "f1",
            &["deadline a", "deadline b", "deadline c", "deadline d"],
        )]);
        let hits = search(&indexes, "deadline", 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].rank, 1);
        assert_eq!(hits[1].rank, 2);
    }

    #[test]
    fn test_search_cjk_query() {
        let indexes = indexes_with(&[("f1", &["项目预算为三百万元", "投标时间在三月"])]);
        let hits = search(&indexes, "预算", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].ordinal, 0);
    }
}
