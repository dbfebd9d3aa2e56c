//! Dense-vector retrieval across all loaded vector indices in a namespace.

use tracing::debug;

use crate::core::{RetrievalHit, RetrievalSource, chunk_id};
use crate::error::GatewayError;
use crate::gateway::{LlmGateway, TextType};
use crate::index::NamespaceIndexes;

/// Returns the top-`k` chunks by cosine similarity to the query embedding.
///
/// Each file index is asked for its top `min(k·2, N)` inner products; hits
/// below `min_similarity` are dropped. Ties sort by larger `file_id` then
/// smaller ordinal, deliberately independent of the BM25 tie-break so
/// fused rankings behave well.
///
/// # Errors
///
/// Propagates [`GatewayError::Embedding`] when the query cannot be
/// embedded. Per-file index problems are not errors; surviving files win.
pub async fn search(
    gateway: &LlmGateway,
    embed_model: &str,
    indexes: &NamespaceIndexes,
    query: &str,
    k: usize,
    min_similarity: f32,
) -> Result<Vec<RetrievalHit>, GatewayError> {
    if indexes.vector.is_empty() || k == 0 {
        return Ok(Vec::new());
    }

    let query_embedding = gateway
        .embed_one(embed_model, query, TextType::Query)
        .await?;

    let mut hits = Vec::new();
    for (file_id, file) in &indexes.vector {
        let per_file_k = (k * 2).min(file.index.ntotal());
        for (ordinal, similarity) in file.index.search(&query_embedding, per_file_k) {
            if similarity < min_similarity {
                continue;
            }
            let Some(text) = file.chunk_file.chunks.get(ordinal) else {
                continue;
            };
            hits.push(RetrievalHit {
                chunk_id: chunk_id(file_id, ordinal),
                text: text.clone(),
                page_number: file.chunk_file.page_number(ordinal),
                file_id: file_id.clone(),
                ordinal,
                score: f64::from(similarity),
                rank: 0,
                source: RetrievalSource::Vector,
                bm25_score: None,
                vector_score: Some(similarity),
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
            .then_with(|| b.file_id.cmp(&a.file_id))
            .then_with(|| a.ordinal.cmp(&b.ordinal))
    });
    hits.truncate(k);
    for (i, hit) in hits.iter_mut().enumerate() {
        hit.rank = i + 1;
        hit.vector_rank = Some(i + 1);
    }

    debug!(hits = hits.len(), "vector retrieval complete");
    Ok(hits)
}
