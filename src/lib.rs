//! # ragcore
//!
//! Agentic Retrieval-Augmented Generation core for multi-tenant document
//! question answering.
//!
//! Questions are answered over a corpus of ingested document chunks by
//! combining lexical (Okapi-BM25) and semantic (flat inner-product)
//! retrieval, LLM-driven re-ranking and iterative navigation under a
//! token budget, a two-tier answer cache, and a citation-grounded answer
//! verifier.
//!
//! ## Features
//!
//! - **Hybrid retrieval**: BM25 and vector search fused with weighted
//!   Reciprocal Rank Fusion
//! - **Agentic navigation**: an LLM routing agent iteratively narrows the
//!   candidate set to a token budget, with deterministic fallbacks
//! - **Verification**: citation extraction and mechanical checks backed
//!   by an LLM cross-check
//! - **Tenant isolation**: every index, cache, and counter is keyed by
//!   `(tenant_id, scenario_id)`

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Note: unsafe is needed for memory-mapped index reads (memmap2)
#![warn(unsafe_code)]

pub mod agent;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod gateway;
pub mod index;
pub mod pipeline;
pub mod retrieval;
pub mod scenario;
pub mod verify;

// Re-export commonly used types at crate root
pub use error::{Error, GatewayError, IndexError, IngestError, Result};

// Re-export core domain types
pub use crate::core::{
    AnswerMode, AnswerRecord, CitationCheck, Difficulty, LlmVerification, Namespace,
    QueryAnalysis, QuestionType, RetrievalHit, RetrievalSource, RoutingDecision, Verification,
};

// Re-export configuration
pub use config::{GatewayConfig, RagConfig, RagConfigBuilder};
pub use scenario::ScenarioConfig;

// Re-export gateway types
pub use gateway::{
    ChatMessage, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse, LlmGateway,
    LlmProvider, OpenAiProvider, ProviderError, ProviderErrorKind, Role, TextType, TokenUsage,
    cosine_similarity, count_tokens_approx, l2_normalize,
};

// Re-export index types
pub use index::{Bm25Bundle, Bm25Index, ChunkFile, IndexStore, VectorIndex, tokenize};

// Re-export retrieval types
pub use retrieval::{HybridConfig, HybridRetriever, RetrievalStats};

// Re-export agent types
pub use agent::{LayeredNavigator, Navigation, RoutedSelection, RoutingAgent};

// Re-export verification and cache
pub use cache::{CacheConfig, CacheStats, SmartCache};
pub use verify::AnswerVerifier;

// Re-export the orchestrator
pub use pipeline::{Orchestrator, PrepareReport, StatusReport};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};
