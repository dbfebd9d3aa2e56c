//! Prompt builders and JSON response parsing for the LLM-driven stages.
//!
//! Every prompt that expects structured output states the exact JSON shape
//! and nothing else; parsing strips code fences and falls back to the
//! outermost brace span when models wrap JSON in prose.

use std::fmt::Write;

use serde::de::DeserializeOwned;

use crate::core::RetrievalHit;

/// Candidates shown to the routing model per call.
pub const ROUTING_CANDIDATE_LIMIT: usize = 15;
/// Characters of chunk text shown per routing candidate.
pub const ROUTING_PREVIEW_CHARS: usize = 150;
/// Context chunks included in the verification prompt.
pub const VERIFY_CHUNK_LIMIT: usize = 3;
/// Characters of chunk text shown per verification chunk.
pub const VERIFY_PREVIEW_CHARS: usize = 300;
/// Context chunks included in the answer prompt.
pub const ANSWER_CHUNK_LIMIT: usize = 5;
/// Characters of chunk text shown per answer-context chunk.
pub const ANSWER_PREVIEW_CHARS: usize = 300;

/// System prompt for query analysis.
pub const ANALYSIS_SYSTEM_PROMPT: &str =
    "You are a professional question analysis assistant. You must respond with \
     strict JSON and nothing else.";

/// System prompt for document routing.
pub const ROUTING_SYSTEM_PROMPT: &str =
    "You are a professional document routing assistant. You must respond with \
     strict JSON and nothing else.";

/// System prompt for answer verification.
pub const VERIFIER_SYSTEM_PROMPT: &str =
    "You are a professional answer verification expert. You must respond with \
     strict JSON and nothing else.";

/// Builds the query-analysis prompt.
#[must_use]
pub fn build_analysis_prompt(scenario_name: &str, question: &str) -> String {
    format!(
        r#"Analyze the user question for a {scenario_name} document QA system.

Question: {question}

Classify along these dimensions:
1. question_type: "fact" (factual lookup), "analysis" (comparison or judgement), or "guidance" (how-to or recommendation)
2. keywords: 3-5 core keywords in the question's language
3. difficulty: "simple", "medium", or "complex"
4. category: a short free-form category label

Respond with strict JSON only:
{{"question_type": "fact|analysis|guidance", "keywords": ["k1", "k2"], "difficulty": "simple|medium|complex", "category": "label"}}"#
    )
}

/// Builds the document-routing prompt.
#[must_use]
pub fn build_routing_prompt(
    scenario_name: &str,
    question: &str,
    chunks_block: &str,
    history: &str,
    top_k: usize,
) -> String {
    let mut prompt = format!(
        r#"Select the document chunks most relevant to the question for a {scenario_name} document QA system.

Question: {question}

Candidate chunks:
{chunks_block}
"#
    );
    if !history.is_empty() {
        let _ = write!(prompt, "\nPrior navigation notes:\n{history}\n");
    }
    let _ = write!(
        prompt,
        r#"
Select at most {top_k} chunks by their bracketed index, explain briefly, estimate your confidence in [0, 1], and say whether surrounding context should be expanded.

Respond with strict JSON only:
{{"selected_indices": [0, 1], "reasoning": "why", "confidence": 0.85, "should_expand": false}}"#
    );
    prompt
}

/// Formats candidate chunks as numbered lines for the routing prompt.
#[must_use]
pub fn format_chunks_for_routing(chunks: &[RetrievalHit]) -> String {
    let mut block = String::new();
    for (i, chunk) in chunks.iter().take(ROUTING_CANDIDATE_LIMIT).enumerate() {
        let source = match serde_json::to_value(chunk.source) {
            Ok(serde_json::Value::String(s)) => s,
            _ => "unknown".to_string(),
        };
        let _ = writeln!(
            block,
            "[{i}] (source:{source}, score:{:.3}) {}...",
            chunk.score,
            chunk.preview(ROUTING_PREVIEW_CHARS)
        );
    }
    block
}

/// Builds the answer-generation prompt from the question and its context.
#[must_use]
pub fn build_answer_prompt(question: &str, context: &[RetrievalHit]) -> String {
    let mut prompt = format!("Question: {question}\n\n");
    if context.is_empty() {
        prompt.push_str(
            "No reference documents are available. Answer from your professional \
             knowledge and say clearly that no source documents were consulted.\n",
        );
    } else {
        prompt.push_str("Reference material:\n");
        for (i, chunk) in context.iter().take(ANSWER_CHUNK_LIMIT).enumerate() {
            let _ = writeln!(
                prompt,
                "\n[Document {}] (page {})\n{}...",
                i + 1,
                chunk.page_number,
                chunk.preview(ANSWER_PREVIEW_CHARS)
            );
        }
        prompt.push_str(
            "\nAnswer from the reference material. Cite pages the way the material \
             does, and say so when the material does not contain the answer.\n",
        );
    }
    prompt.push_str("\nAnswer:");
    prompt
}

/// Builds the answer-verification prompt.
#[must_use]
pub fn build_verification_prompt(
    question: &str,
    answer: &str,
    chunks: &[RetrievalHit],
) -> String {
    let mut sources = String::new();
    for (i, chunk) in chunks.iter().take(VERIFY_CHUNK_LIMIT).enumerate() {
        let _ = writeln!(
            sources,
            "[Document {}] {}",
            i + 1,
            chunk.preview(VERIFY_PREVIEW_CHARS)
        );
    }

    format!(
        r#"Verify whether the answer is grounded in the source documents.

Question: {question}

Answer:
{answer}

Source documents:
{sources}
Check that the answer is based on the sources, contains no factual errors, and does not over-reach beyond them.

Respond with strict JSON only:
{{"is_valid": true, "confidence": 0.9, "reasoning": "short justification"}}"#
    )
}

/// Parses a JSON value of type `T` from model output.
///
/// Strips markdown code fences, tries a direct parse, then falls back to
/// the outermost `{…}` span. Returns `None` when nothing parses; callers
/// apply their rule-based fallbacks.
#[must_use]
pub fn parse_json_response<T: DeserializeOwned>(content: &str) -> Option<T> {
    let trimmed = content.trim();
    let unfenced = if trimmed.starts_with("```") {
        trimmed
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim()
    } else {
        trimmed
    };

    if let Ok(value) = serde_json::from_str::<T>(unfenced) {
        return Some(value);
    }

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<T>(&unfenced[start..=end]).ok()
}
