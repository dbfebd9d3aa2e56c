//! Typed records exchanged with the LLM-driven pipeline stages.
//!
//! LLM JSON responses are parsed strictly into these types; unknown fields
//! are dropped and any schema violation triggers the rule-based fallback
//! at the call site rather than propagating.

use serde::{Deserialize, Serialize};

use super::hit::RetrievalHit;

/// Classification of what a question asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    /// Factual lookup.
    Fact,
    /// Comparative or evaluative analysis.
    Analysis,
    /// How-to or recommendation.
    Guidance,
}

/// Estimated difficulty of answering a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    /// Single-fact lookup.
    Simple,
    /// Requires combining a few chunks.
    Medium,
    /// Requires multi-document reasoning.
    Complex,
}

/// Result of query analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// Question classification.
    pub question_type: QuestionType,
    /// Up to five core keywords.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Estimated difficulty.
    #[serde(default = "default_difficulty")]
    pub difficulty: Difficulty,
    /// Free-form category label.
    #[serde(default)]
    pub category: String,
}

const fn default_difficulty() -> Difficulty {
    Difficulty::Medium
}

/// LLM decision about which candidate chunks to keep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Indices into the candidate list, at most `top_k` of them.
    pub selected_indices: Vec<usize>,
    /// Why these chunks were selected.
    #[serde(default)]
    pub reasoning: String,
    /// Confidence in the selection, clamped to `[0, 1]`.
    #[serde(default = "default_routing_confidence")]
    pub confidence: f64,
    /// Whether the model thinks neighboring context should be pulled in.
    #[serde(default)]
    pub should_expand: bool,
}

const fn default_routing_confidence() -> f64 {
    0.8
}

/// Outcome of the citation existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationCheck {
    /// Citations present and every one resolved against the sources.
    Passed,
    /// At least one citation did not resolve.
    Failed,
    /// The answer contained no citations.
    NoCitations,
    /// Verification was not attempted (empty answer or no context).
    Skipped,
    /// The check itself failed.
    Error,
}

/// Outcome of the LLM cross-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmVerification {
    /// Cross-check ran and its verdict was folded in.
    Completed,
    /// Cross-check ran but its output was unusable.
    Failed,
    /// Cross-check was not attempted.
    Skipped,
    /// Cross-check errored.
    Error,
}

/// Verification record attached to every answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    /// Whether the answer is considered grounded.
    pub is_valid: bool,
    /// Combined confidence in `[0, 1]`, rounded to two decimals.
    pub confidence: f64,
    /// Human-readable verification reasoning.
    pub reasoning: String,
    /// Citation check outcome.
    pub citation_check: CitationCheck,
    /// Citations that failed to resolve, in first-seen order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_citations: Vec<String>,
    /// LLM cross-check outcome.
    pub llm_verification: LlmVerification,
}

impl Verification {
    /// Verification record for answers produced without any context.
    #[must_use]
    pub fn skipped(reasoning: &str) -> Self {
        Self {
            is_valid: true,
            confidence: 0.5,
            reasoning: reasoning.to_string(),
            citation_check: CitationCheck::Skipped,
            invalid_citations: Vec::new(),
            llm_verification: LlmVerification::Skipped,
        }
    }
}

/// How the answer was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Grounded in retrieved context.
    Rag,
    /// LLM answered without retrieved context.
    PureLlm,
}

/// The full result of processing one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// Whether processing completed without a hard failure.
    pub success: bool,
    /// The original question.
    pub question: String,
    /// Generated answer text.
    pub answer: String,
    /// Verification reasoning (or a generation note when unverified).
    pub reasoning: String,
    /// Distinct page numbers of the context chunks, in context order.
    pub relevant_pages: Vec<u32>,
    /// Final confidence in `[0, 1]`.
    pub confidence: f64,
    /// Wall-clock processing time.
    pub processing_time_ms: u64,
    /// Context chunks the answer was grounded in.
    pub source_chunks: Vec<RetrievalHit>,
    /// Verification record.
    pub verification: Verification,
    /// Whether the answer used retrieved context.
    pub mode: AnswerMode,
}
