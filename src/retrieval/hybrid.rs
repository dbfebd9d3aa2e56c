//! Hybrid retrieval: lexical and semantic retrieval fused with weighted
//! Reciprocal Rank Fusion.
//!
//! Based on: Cormack, Clarke, Buettcher (2009) - "Reciprocal Rank Fusion
//! outperforms Condorcet and individual Rank Learning Methods"

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::core::{RetrievalHit, RetrievalSource};
use crate::gateway::LlmGateway;
use crate::index::NamespaceIndexes;

use super::stats::{QueryOutcome, RetrievalStats};
use super::{bm25, vector};

/// Configuration for one namespace's hybrid retriever.
#[derive(Debug, Clone)]
pub struct HybridConfig {
    /// Enable lexical retrieval.
    pub use_bm25: bool,
    /// Enable vector retrieval.
    pub use_vector: bool,
    /// RRF rank constant.
    pub rrf_k: u32,
    /// Weight of BM25 ranks in the fusion.
    pub bm25_weight: f64,
    /// Weight of vector ranks in the fusion.
    pub vector_weight: f64,
    /// Vector-hit similarity cutoff.
    pub min_similarity: f32,
    /// Embedding model for query vectors.
    pub embed_model: String,
}

/// Fuses lexical and semantic evidence into one ranking.
#[derive(Debug)]
pub struct HybridRetriever {
    config: HybridConfig,
    stats: Mutex<RetrievalStats>,
}

impl HybridRetriever {
    /// Creates a retriever with the given configuration.
    #[must_use]
    pub fn new(config: HybridConfig) -> Self {
        Self {
            config,
            stats: Mutex::new(RetrievalStats::default()),
        }
    }

    /// Snapshot of the rolling statistics.
    #[must_use]
    pub fn stats(&self) -> RetrievalStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Retrieves the top-`k` fused hits for a question.
    ///
    /// Both retrievers run concurrently with `k' = k·2` so the fusion has
    /// room. Retriever failures degrade: the surviving side passes through,
    /// and both sides empty is an empty result, not an error.
    pub async fn retrieve(
        &self,
        gateway: &LlmGateway,
        indexes: Arc<NamespaceIndexes>,
        question: &str,
        top_k: usize,
    ) -> Vec<RetrievalHit> {
        let start = Instant::now();
        let fetch_k = top_k * 2;

        let bm25_handle = if self.config.use_bm25 {
            let indexes = Arc::clone(&indexes);
            let question = question.to_string();
            Some(tokio::task::spawn_blocking(move || {
                bm25::search(&indexes, &question, fetch_k)
            }))
        } else {
            None
        };

        let vector_hits = if self.config.use_vector {
            match vector::search(
                gateway,
                &self.config.embed_model,
                &indexes,
                question,
                fetch_k,
                self.config.min_similarity,
            )
            .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("vector retrieval failed, continuing lexical-only: {e}");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let bm25_hits = match bm25_handle {
            Some(handle) => match handle.await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("BM25 task failed, continuing vector-only: {e}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        debug!(
            bm25 = bm25_hits.len(),
            vector = vector_hits.len(),
            "retriever fan-out complete"
        );

        let (results, outcome) = match (bm25_hits.is_empty(), vector_hits.is_empty()) {
            (true, true) => (Vec::new(), QueryOutcome::Failed),
            (false, true) => (truncate_ranked(bm25_hits, top_k), QueryOutcome::Bm25Only),
            (true, false) => (truncate_ranked(vector_hits, top_k), QueryOutcome::VectorOnly),
            (false, false) => (
                self.fuse(&bm25_hits, &vector_hits, top_k),
                QueryOutcome::Hybrid,
            ),
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        if let Ok(mut stats) = self.stats.lock() {
            stats.record(outcome, elapsed_ms);
        }

        info!(
            results = results.len(),
            outcome = ?outcome,
            elapsed_ms = format_args!("{elapsed_ms:.1}"),
            "hybrid retrieval complete"
        );
        results
    }

    /// Weighted RRF: each hit at 1-based rank `r` in list `L` contributes
    /// `weight_L / (K + r)` to its chunk's fused score.
    fn fuse(
        &self,
        bm25_hits: &[RetrievalHit],
        vector_hits: &[RetrievalHit],
        top_k: usize,
    ) -> Vec<RetrievalHit> {
        let k = f64::from(self.config.rrf_k);
        let mut fused: HashMap<String, RetrievalHit> = HashMap::new();

        for (rank0, hit) in bm25_hits.iter().enumerate() {
            let rank = rank0 + 1;
            #[allow(clippy::cast_precision_loss)]
            let contribution = self.config.bm25_weight / (k + rank as f64);
            let entry = fused.entry(hit.chunk_id.clone()).or_insert_with(|| {
                let mut base = hit.clone();
                base.source = RetrievalSource::Hybrid;
                base.rrf_score = Some(0.0);
                base
            });
            entry.bm25_score = hit.bm25_score;
            entry.bm25_rank = Some(rank);
            entry.rrf_score = Some(entry.rrf_score.unwrap_or(0.0) + contribution);
        }

        for (rank0, hit) in vector_hits.iter().enumerate() {
            let rank = rank0 + 1;
            #[allow(clippy::cast_precision_loss)]
            let contribution = self.config.vector_weight / (k + rank as f64);
            let entry = fused.entry(hit.chunk_id.clone()).or_insert_with(|| {
                let mut base = hit.clone();
                base.source = RetrievalSource::Hybrid;
                base.rrf_score = Some(0.0);
                base
            });
            entry.vector_score = hit.vector_score;
            entry.vector_rank = Some(rank);
            // Vector metadata carries true page numbers; prefer them over
            // the BM25 pseudo-page.
            entry.page_number = hit.page_number;
            entry.rrf_score = Some(entry.rrf_score.unwrap_or(0.0) + contribution);
        }

        let mut results: Vec<RetrievalHit> = fused.into_values().collect();
        results.sort_by(|a, b| {
            let rrf_a = a.rrf_score.unwrap_or(0.0);
            let rrf_b = b.rrf_score.unwrap_or(0.0);
            rrf_b
                .partial_cmp(&rrf_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    let bm_a = a.bm25_score.unwrap_or(0.0);
                    let bm_b = b.bm25_score.unwrap_or(0.0);
                    bm_b.partial_cmp(&bm_a).unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.file_id.cmp(&b.file_id))
                .then_with(|| a.ordinal.cmp(&b.ordinal))
        });
        results.truncate(top_k);

        for (i, hit) in results.iter_mut().enumerate() {
            hit.rank = i + 1;
            hit.score = hit.rrf_score.unwrap_or(0.0);
        }
        results
    }
}

fn truncate_ranked(mut hits: Vec<RetrievalHit>, top_k: usize) -> Vec<RetrievalHit> {
    hits.truncate(top_k);
    for (i, hit) in hits.iter_mut().enumerate() {
        hit.rank = i + 1;
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::core::chunk_id;
    use crate::gateway::{
        ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, LlmProvider, ProviderError,
        TokenUsage,
    };
    use async_trait::async_trait;

    struct NullProvider;

    #[async_trait]
    impl LlmProvider for NullProvider {
        fn name(&self) -> &'static str {
            "null"
        }

        async fn chat(&self, _r: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::fatal("unused"))
        }

        async fn embed(&self, r: &EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            Ok(EmbeddingResponse {
                embeddings: r.input.iter().map(|_| vec![1.0, 0.0]).collect(),
                usage: TokenUsage::default(),
            })
        }
    }

    fn config() -> HybridConfig {
        HybridConfig {
            use_bm25: true,
            use_vector: true,
            rrf_k: 60,
            bm25_weight: 0.5,
            vector_weight: 0.5,
            min_similarity: 0.5,
            embed_model: "m".to_string(),
        }
    }

    fn hit(file_id: &str, ordinal: usize, source: RetrievalSource, score: f64) -> RetrievalHit {
        RetrievalHit {
            chunk_id: chunk_id(file_id, ordinal),
            text: format!("chunk {file_id}/{ordinal}"),
            page_number: (ordinal + 1) as u32,
            file_id: file_id.to_string(),
            ordinal,
            score,
            rank: 0,
            source,
            bm25_score: (source == RetrievalSource::Bm25).then_some(score),
            vector_score: (source == RetrievalSource::Vector).then_some(score as f32),
            bm25_rank: None,
            vector_rank: None,
            rrf_score: None,
            needs_expansion: false,
        }
    }

    #[test]
    fn test_fuse_matches_reference_scores() {
        // BM25 [X@1, Y@2], vector [Y@1, Z@2], K=60, weights 0.5/0.5:
        //   X = 0.5/61, Y = 0.5/62 + 0.5/61, Z = 0.5/62 → order Y, X, Z.
        let retriever = HybridRetriever::new(config());
        let bm25_hits = vec![
            hit("x", 0, RetrievalSource::Bm25, 5.0),
            hit("y", 0, RetrievalSource::Bm25, 4.0),
        ];
        let vector_hits = vec![
            hit("y", 0, RetrievalSource::Vector, 0.9),
            hit("z", 0, RetrievalSource::Vector, 0.8),
        ];
        let fused = retriever.fuse(&bm25_hits, &vector_hits, 10);

        assert_eq!(fused.len(), 3);
        assert_eq!(fused[0].file_id, "y");
        assert_eq!(fused[1].file_id, "x");
        assert_eq!(fused[2].file_id, "z");

        let y = fused[0].rrf_score.unwrap();
        let x = fused[1].rrf_score.unwrap();
        let z = fused[2].rrf_score.unwrap();
        assert!((y - (0.5 / 62.0 + 0.5 / 61.0)).abs() < 1e-9);
        assert!((x - 0.5 / 61.0).abs() < 1e-9);
        assert!((z - 0.5 / 62.0).abs() < 1e-9);

        // Fused hits carry both ranks where applicable.
        assert_eq!(fused[0].bm25_rank, Some(2));
        assert_eq!(fused[0].vector_rank, Some(1));
        assert_eq!(fused[0].source, RetrievalSource::Hybrid);
    }

    #[test]
    fn test_fuse_rrf_monotone_non_increasing() {
        let retriever = HybridRetriever::new(config());
        let bm25_hits: Vec<RetrievalHit> = (0..6)
            .map(|i| hit("a", i, RetrievalSource::Bm25, 10.0 - i as f64))
            .collect();
        let vector_hits: Vec<RetrievalHit> = (0..6)
            .rev()
            .map(|i| hit("a", i, RetrievalSource::Vector, 0.9))
            .collect();
        let fused = retriever.fuse(&bm25_hits, &vector_hits, 10);
        for pair in fused.windows(2) {
            assert!(pair[0].rrf_score.unwrap() >= pair[1].rrf_score.unwrap());
        }
    }

    #[test]
    fn test_fuse_tie_breaks_on_bm25_score() {
        let retriever = HybridRetriever::new(config());
        // a and b swap ranks between the two lists, so their fused scores
        // tie exactly; the higher raw BM25 score must win.
        let bm25_list = vec![
            hit("a", 0, RetrievalSource::Bm25, 3.0),
            hit("b", 0, RetrievalSource::Bm25, 7.0),
        ];
        let vector_list = vec![
            hit("b", 0, RetrievalSource::Vector, 0.9),
            hit("a", 0, RetrievalSource::Vector, 0.9),
        ];
        let fused = retriever.fuse(&bm25_list, &vector_list, 10);
        // a: 0.5/61 + 0.5/62, b: 0.5/62 + 0.5/61 → exact tie; b has the
        // higher raw BM25 score.
        assert_eq!(fused[0].file_id, "b");
    }

    #[test]
    fn test_fuse_prefers_vector_page_number() {
        let retriever = HybridRetriever::new(config());
        let bm25_hits = vec![hit("a", 4, RetrievalSource::Bm25, 2.0)];
        let mut v = hit("a", 4, RetrievalSource::Vector, 0.9);
        v.page_number = 12;
        let fused = retriever.fuse(&bm25_hits, &[v], 10);
        assert_eq!(fused[0].page_number, 12);
    }

    #[tokio::test]
    async fn test_retrieve_empty_namespace_counts_failed() {
        let retriever = HybridRetriever::new(config());
        let gw = LlmGateway::new(Arc::new(NullProvider), GatewayConfig::immediate());
        let results = retriever
            .retrieve(&gw, Arc::new(NamespaceIndexes::default()), "q", 5)
            .await;
        assert!(results.is_empty());
        let stats = retriever.stats();
        assert_eq!(stats.total_queries, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn test_retrieve_bm25_only_when_vector_absent() {
        use crate::index::{Bm25File, Bm25Index};

        let mut indexes = NamespaceIndexes::default();
        let chunks = vec!["the deadline is friday".to_string()];
        indexes.bm25.insert(
            "f1".to_string(),
            Bm25File {
                index: Bm25Index::build(&chunks),
                chunks,
            },
        );

        let retriever = HybridRetriever::new(config());
        let gw = LlmGateway::new(Arc::new(NullProvider), GatewayConfig::immediate());
        let results = retriever
            .retrieve(&gw, Arc::new(indexes), "deadline", 5)
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source, RetrievalSource::Bm25);
        assert_eq!(retriever.stats().bm25_only, 1);
    }

    #[tokio::test]
    async fn test_retrieve_vector_only_when_bm25_disabled() {
        use crate::index::{ChunkFile, ChunkMetadata, VectorFile, VectorIndex};

        let mut indexes = NamespaceIndexes::default();
        indexes.vector.insert(
            "f1".to_string(),
            VectorFile {
                index: VectorIndex::from_vectors(&[vec![1.0, 0.0]]).unwrap(),
                chunk_file: ChunkFile {
                    chunks: vec!["deadline text".to_string()],
                    chunk_metadata: vec![ChunkMetadata { page_number: 2 }],
                },
            },
        );

        let mut cfg = config();
        cfg.use_bm25 = false;
        let retriever = HybridRetriever::new(cfg);
        let gw = LlmGateway::new(Arc::new(NullProvider), GatewayConfig::immediate());
        let results = retriever.retrieve(&gw, Arc::new(indexes), "q", 5).await;
        assert_eq!(results.len(), 1);
        assert_eq!(retriever.stats().vector_only, 1);
    }
}
