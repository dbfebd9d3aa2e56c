//! Top-level orchestration: cache → retrieval → navigation → generation →
//! verification → cache write.
//!
//! The orchestrator owns every component and passes each stage only the
//! references it needs; per-namespace state (cache, retriever statistics,
//! scenario configuration) lives in a registry keyed by
//! `(tenant_id, scenario_id)`.
//!
//! Degradation policy: empty retrieval and routing/navigation failures
//! fall through to earlier-stage output, ending at pure-LLM mode with
//! neutral confidence. Only upstream LLM exhaustion, deadline expiry, and
//! input validation surface as errors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::agent::{LayeredNavigator, RoutingAgent, build_answer_prompt};
use crate::cache::{CacheConfig, CacheStats, SmartCache};
use crate::config::RagConfig;
use crate::core::{
    AnswerMode, AnswerRecord, Namespace, QuestionType, RetrievalHit, Verification,
};
use crate::error::{Error, IngestError, Result};
use crate::gateway::{LlmGateway, LlmProvider, TextType};
use crate::index::{
    Bm25Bundle, Bm25BundleMetadata, CHUNKS_FILE_SUFFIX, ChunkFile, IndexStore, VECTOR_FILE_SUFFIX,
    VectorIndex, list_files_with_suffix,
};
use crate::retrieval::{HybridConfig, HybridRetriever, RetrievalStats};
use crate::scenario::ScenarioConfig;
use crate::verify::AnswerVerifier;

/// Generation temperature for answers.
const ANSWER_TEMPERATURE: f32 = 0.3;
/// Tokens allowed for generated answers.
const ANSWER_MAX_TOKENS: u32 = 1000;
/// Retrieval breadth multiplier before routing.
const RETRIEVE_MULTIPLIER: usize = 3;
/// Routing breadth multiplier before navigation.
const ROUTE_MULTIPLIER: usize = 2;

/// Result of preparing a namespace.
#[derive(Debug, Clone, Serialize)]
pub struct PrepareReport {
    /// Chunk files parsed.
    pub parsed: usize,
    /// Per-file indices loaded after preparation.
    pub indexed: usize,
    /// Wall-clock preparation time.
    pub total_time_ms: u64,
}

/// Snapshot of a namespace's operational state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Per-file indices currently loaded in memory.
    pub indices_loaded: usize,
    /// Answer-cache statistics.
    pub cache_stats: CacheStats,
    /// Hybrid-retrieval statistics.
    pub retrieval_stats: RetrievalStats,
}

/// Per-namespace component set.
struct NamespaceState {
    scenario: Arc<ScenarioConfig>,
    cache: SmartCache,
    retriever: HybridRetriever,
    routing: RoutingAgent,
    navigator: LayeredNavigator,
    verifier: AnswerVerifier,
}

/// The question-answering orchestrator.
pub struct Orchestrator {
    config: RagConfig,
    gateway: Arc<LlmGateway>,
    store: IndexStore,
    namespaces: Mutex<HashMap<Namespace, Arc<NamespaceState>>>,
}

impl Orchestrator {
    /// Creates an orchestrator over the given provider.
    #[must_use]
    pub fn new(config: RagConfig, provider: Arc<dyn LlmProvider>) -> Self {
        let gateway = Arc::new(LlmGateway::new(provider, config.gateway.clone()));
        let store = IndexStore::new(config.data_root.clone());
        Self {
            config,
            gateway,
            store,
            namespaces: Mutex::new(HashMap::new()),
        }
    }

    /// Answers a question for a namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] on malformed inputs,
    /// [`Error::Deadline`] when the request-wide deadline expires before
    /// an answer exists, and [`Error::Gateway`] when generation exhausts
    /// its retries. Everything else degrades internally.
    #[allow(clippy::too_many_lines)]
    pub async fn process_question(
        &self,
        tenant_id: &str,
        scenario_id: &str,
        question: &str,
        question_type: Option<QuestionType>,
    ) -> Result<AnswerRecord> {
        validate_inputs(tenant_id, scenario_id, question)?;

        let start = Instant::now();
        let deadline = start + self.config.request_timeout;
        let namespace = Namespace::new(tenant_id, scenario_id);
        let state = self.namespace_state(&namespace);

        info!(namespace = %namespace, question = %truncate_for_log(question), "processing question");

        // Cache first: an exact hit answers repeat questions with zero
        // LLM and embedding calls.
        if let Some(cached) = state.cache.lookup(&self.gateway, question).await {
            info!(namespace = %namespace, "cache hit, returning stored answer");
            return Ok(cached);
        }

        let analysis = state.routing.analyze_query(&self.gateway, question).await;
        let effective_type = question_type.unwrap_or(analysis.question_type);
        debug!(?effective_type, keywords = ?analysis.keywords, "question analyzed");

        remaining(start, deadline)?;

        let context = match tokio::time::timeout(
            deadline.saturating_duration_since(Instant::now()),
            self.build_context(&state, &namespace, question),
        )
        .await
        {
            Ok(context) => context,
            Err(_) => return Err(deadline_error(start)),
        };

        remaining(start, deadline)?;
        let answer = match tokio::time::timeout(
            deadline.saturating_duration_since(Instant::now()),
            self.gateway.chat_text(
                &self.config.mid_model,
                &state.scenario.system_prompt,
                &build_answer_prompt(question, &context),
                ANSWER_TEMPERATURE,
                ANSWER_MAX_TOKENS,
            ),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(Error::Gateway(e)),
            Err(_) => return Err(deadline_error(start)),
        };

        // An answer text exists from here on: deadline expiry degrades to
        // a partial pure-LLM record instead of an error.
        let verification = if context.is_empty() {
            Verification::skipped("answered without retrieved context")
        } else {
            match tokio::time::timeout(
                deadline.saturating_duration_since(Instant::now()),
                state
                    .verifier
                    .verify_answer(&self.gateway, &answer, &context, question),
            )
            .await
            {
                Ok(verification) => verification,
                Err(_) => {
                    warn!("deadline expired during verification, returning partial answer");
                    return Ok(partial_record(question, answer, start));
                }
            }
        };

        let mode = if context.is_empty() {
            AnswerMode::PureLlm
        } else {
            AnswerMode::Rag
        };
        let record = AnswerRecord {
            success: true,
            question: question.to_string(),
            answer,
            reasoning: verification.reasoning.clone(),
            relevant_pages: distinct_pages(&context),
            confidence: verification.confidence,
            processing_time_ms: elapsed_ms(start),
            source_chunks: context,
            verification,
            mode,
        };

        state
            .cache
            .store(&self.gateway, question, &record, true)
            .await;

        info!(
            namespace = %namespace,
            mode = ?record.mode,
            confidence = record.confidence,
            elapsed_ms = record.processing_time_ms,
            "question processed"
        );
        Ok(record)
    }

    /// Prepares a namespace: builds missing (or, with `force_rebuild`,
    /// all) BM25 bundles and vector index files from the namespace's
    /// chunk files, then loads everything into memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NamespaceUnknown`] when the namespace has no data
    /// directory and [`Error::Ingest`] when a chunk file is invalid, an
    /// index cannot be written, or the chunk corpus cannot be embedded.
    pub async fn prepare_namespace(
        &self,
        tenant_id: &str,
        scenario_id: &str,
        force_rebuild: bool,
    ) -> Result<PrepareReport> {
        let start = Instant::now();
        let namespace = Namespace::new(tenant_id, scenario_id);
        let vector_dir = namespace.vector_dir(self.store.root());
        if !vector_dir.is_dir() {
            return Err(Error::NamespaceUnknown {
                tenant_id: tenant_id.to_string(),
                scenario_id: scenario_id.to_string(),
            });
        }

        let bm25_dir = namespace.bm25_dir(self.store.root());
        std::fs::create_dir_all(&bm25_dir).map_err(|e| IngestError::Directory {
            path: bm25_dir.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut parsed = 0usize;
        for (file_id, chunks_path) in list_files_with_suffix(&vector_dir, CHUNKS_FILE_SUFFIX) {
            let chunk_file =
                ChunkFile::load(&chunks_path).map_err(|e| IngestError::ChunkFile {
                    path: chunks_path.display().to_string(),
                    reason: e.to_string(),
                })?;
            parsed += 1;

            let bundle_path = bm25_dir.join(format!("{file_id}.bm25.json"));
            if force_rebuild || !bundle_path.is_file() {
                Bm25Bundle {
                    chunks: chunk_file.chunks.clone(),
                    metadata: Bm25BundleMetadata {
                        file_id: file_id.clone(),
                    },
                }
                .save(&bundle_path)
                .map_err(|e| IngestError::Write {
                    path: bundle_path.display().to_string(),
                    reason: e.to_string(),
                })?;
                debug!(file_id, "BM25 bundle written");
            }

            let vector_path = vector_dir.join(format!("{file_id}{VECTOR_FILE_SUFFIX}"));
            if force_rebuild || !vector_path.is_file() {
                let embeddings = self
                    .gateway
                    .embed(
                        &self.config.embed_model,
                        &chunk_file.chunks,
                        TextType::Document,
                    )
                    .await
                    .map_err(IngestError::from)?;
                let index =
                    VectorIndex::from_vectors(&embeddings).map_err(|e| IngestError::Write {
                        path: vector_path.display().to_string(),
                        reason: e.to_string(),
                    })?;
                index.save(&vector_path).map_err(|e| IngestError::Write {
                    path: vector_path.display().to_string(),
                    reason: e.to_string(),
                })?;
                debug!(file_id, vectors = index.ntotal(), "vector index written");
            }
        }

        self.store.evict(&namespace);
        let indexes = self.store.get_or_load(&namespace);
        let report = PrepareReport {
            parsed,
            indexed: indexes.indices_loaded(),
            total_time_ms: elapsed_ms(start),
        };
        info!(namespace = %namespace, ?report, "namespace prepared");
        Ok(report)
    }

    /// Reports a namespace's loaded indices and statistics. Does not
    /// trigger an index load.
    #[must_use]
    pub fn get_status(&self, tenant_id: &str, scenario_id: &str) -> StatusReport {
        let namespace = Namespace::new(tenant_id, scenario_id);
        let state = self.namespace_state(&namespace);
        StatusReport {
            indices_loaded: self.store.loaded_count(&namespace),
            cache_stats: state.cache.stats(),
            retrieval_stats: state.retriever.stats(),
        }
    }

    /// Retrieval → routing → navigation, with each stage falling back to
    /// the previous stage's output.
    async fn build_context(
        &self,
        state: &NamespaceState,
        namespace: &Namespace,
        question: &str,
    ) -> Vec<RetrievalHit> {
        let indexes = self.store.get_or_load(namespace);
        if indexes.is_empty() {
            info!(namespace = %namespace, "no indices loaded, pure-LLM fallback");
            return Vec::new();
        }

        let hits = state
            .retriever
            .retrieve(
                &self.gateway,
                indexes,
                question,
                self.config.retrieve_k * RETRIEVE_MULTIPLIER,
            )
            .await;
        if hits.is_empty() {
            info!(namespace = %namespace, "retrieval empty, pure-LLM fallback");
            return Vec::new();
        }

        let routed = state
            .routing
            .route_documents(
                &self.gateway,
                &hits,
                question,
                "",
                self.config.retrieve_k * ROUTE_MULTIPLIER,
            )
            .await;
        let candidates = if routed.chunks.is_empty() {
            hits
        } else {
            routed.chunks
        };

        let navigation = state
            .navigator
            .navigate(&self.gateway, &state.routing, candidates, question)
            .await;
        let mut context = navigation.chunks;
        context.truncate(self.config.retrieve_k);
        context
    }

    /// Returns the namespace's component set, creating it on first use.
    fn namespace_state(&self, namespace: &Namespace) -> Arc<NamespaceState> {
        if let Ok(mut guard) = self.namespaces.lock() {
            if let Some(existing) = guard.get(namespace) {
                return Arc::clone(existing);
            }
            let state = Arc::new(self.build_state(namespace));
            guard.insert(namespace.clone(), Arc::clone(&state));
            return state;
        }
        Arc::new(self.build_state(namespace))
    }

    fn build_state(&self, namespace: &Namespace) -> NamespaceState {
        let scenario = Arc::new(ScenarioConfig::builtin(&namespace.scenario_id));
        NamespaceState {
            cache: SmartCache::new(CacheConfig {
                max_size: self.config.cache_max_size,
                exact_ttl: self.config.exact_ttl,
                semantic_ttl: self.config.semantic_ttl,
                semantic_threshold: self.config.semantic_threshold,
                embed_model: self.config.embed_model.clone(),
            }),
            retriever: HybridRetriever::new(HybridConfig {
                use_bm25: self.config.use_bm25,
                use_vector: self.config.use_vector,
                rrf_k: self.config.rrf_k,
                bm25_weight: self.config.bm25_weight,
                vector_weight: self.config.vector_weight,
                min_similarity: self.config.min_similarity,
                embed_model: self.config.embed_model.clone(),
            }),
            routing: RoutingAgent::new(&self.config.fast_model, Arc::clone(&scenario)),
            navigator: LayeredNavigator::new(
                self.config.navigator_max_rounds,
                self.config.navigator_target_tokens,
            ),
            verifier: AnswerVerifier::new(&self.config.verifier_model, &scenario),
            scenario,
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("gateway", &self.gateway)
            .finish()
    }
}

fn validate_inputs(tenant_id: &str, scenario_id: &str, question: &str) -> Result<()> {
    if tenant_id.trim().is_empty() || scenario_id.trim().is_empty() {
        return Err(Error::Validation {
            message: "tenant_id and scenario_id must be non-empty".to_string(),
        });
    }
    if question.trim().is_empty() {
        return Err(Error::Validation {
            message: "question must be non-empty".to_string(),
        });
    }
    Ok(())
}

fn remaining(start: Instant, deadline: Instant) -> Result<()> {
    if Instant::now() >= deadline {
        return Err(deadline_error(start));
    }
    Ok(())
}

fn deadline_error(start: Instant) -> Error {
    Error::Deadline {
        elapsed_ms: elapsed_ms(start),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Partial record returned when the deadline fires after generation but
/// before verification finished.
fn partial_record(question: &str, answer: String, start: Instant) -> AnswerRecord {
    AnswerRecord {
        success: true,
        question: question.to_string(),
        answer,
        reasoning: "request deadline expired before verification".to_string(),
        relevant_pages: Vec::new(),
        confidence: 0.5,
        processing_time_ms: elapsed_ms(start),
        source_chunks: Vec::new(),
        verification: Verification::skipped("request deadline expired"),
        mode: AnswerMode::PureLlm,
    }
}

/// Distinct page numbers in context order.
fn distinct_pages(context: &[RetrievalHit]) -> Vec<u32> {
    let mut pages = Vec::new();
    for chunk in context {
        if !pages.contains(&chunk.page_number) {
            pages.push(chunk.page_number);
        }
    }
    pages
}

fn truncate_for_log(question: &str) -> String {
    question.chars().take(60).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_pages_preserves_order() {
        use crate::core::{RetrievalSource, chunk_id};
        let hit = |page: u32| RetrievalHit {
            chunk_id: chunk_id("f", page as usize),
            text: "t".to_string(),
            page_number: page,
            file_id: "f".to_string(),
            ordinal: page as usize,
            score: 1.0,
            rank: 1,
            source: RetrievalSource::Hybrid,
            bm25_score: None,
            vector_score: None,
            bm25_rank: None,
            vector_rank: None,
            rrf_score: None,
            needs_expansion: false,
        };
        let pages = distinct_pages(&[hit(5), hit(3), hit(5), hit(7)]);
        assert_eq!(pages, vec![5, 3, 7]);
    }

    #[test]
    fn test_validate_inputs() {
        assert!(validate_inputs("t", "s", "q").is_ok());
        assert!(validate_inputs("", "s", "q").is_err());
        assert!(validate_inputs("t", " ", "q").is_err());
        assert!(validate_inputs("t", "s", "  ").is_err());
    }

    #[test]
    fn test_partial_record_shape() {
        let record = partial_record("q", "partial answer".to_string(), Instant::now());
        assert!(record.success);
        assert_eq!(record.mode, AnswerMode::PureLlm);
        assert!((record.confidence - 0.5).abs() < f64::EPSILON);
        assert!(record.source_chunks.is_empty());
    }
}
