//! Core domain types for the RAG pipeline.
//!
//! These types flow between every pipeline stage: the namespace that scopes
//! all data access, retrieval hits produced by the retrievers, and the
//! analysis, routing, verification, and answer records exchanged with the
//! LLM-driven stages.

mod answer;
mod hit;
mod namespace;

pub use answer::{
    AnswerMode, AnswerRecord, CitationCheck, Difficulty, LlmVerification, QueryAnalysis,
    QuestionType, RoutingDecision, Verification,
};
pub use hit::{RetrievalHit, RetrievalSource, chunk_id};
pub use namespace::Namespace;
