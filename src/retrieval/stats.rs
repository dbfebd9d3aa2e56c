//! Rolling retrieval statistics, reported through `get_status`.

use serde::Serialize;

/// How one hybrid query resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Only the lexical retriever returned results.
    Bm25Only,
    /// Only the vector retriever returned results.
    VectorOnly,
    /// Both retrievers returned and fusion ran.
    Hybrid,
    /// Neither retriever returned anything.
    Failed,
}

/// Rolling counters for one namespace's hybrid retriever.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalStats {
    /// Queries observed.
    pub total_queries: u64,
    /// Rolling mean latency in milliseconds.
    pub avg_time_ms: f64,
    /// Queries answered by BM25 alone.
    pub bm25_only: u64,
    /// Queries answered by vector retrieval alone.
    pub vector_only: u64,
    /// Queries that fused both retrievers.
    pub hybrid: u64,
    /// Queries where both retrievers came back empty.
    pub failed: u64,
}

impl RetrievalStats {
    /// Folds one query into the counters and the rolling mean.
    pub fn record(&mut self, outcome: QueryOutcome, elapsed_ms: f64) {
        self.total_queries += 1;
        match outcome {
            QueryOutcome::Bm25Only => self.bm25_only += 1,
            QueryOutcome::VectorOnly => self.vector_only += 1,
            QueryOutcome::Hybrid => self.hybrid += 1,
            QueryOutcome::Failed => self.failed += 1,
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.total_queries as f64;
        self.avg_time_ms = (self.avg_time_ms * (n - 1.0) + elapsed_ms) / n;
    }
}
