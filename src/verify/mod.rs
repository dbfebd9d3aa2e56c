//! Citation-grounded answer verification.
//!
//! Three layers, cheapest first: extract citations with the scenario's
//! patterns, check each against the source chunks mechanically, then ask
//! a higher-quality model whether the answer is grounded. A single
//! invalid citation fails the answer outright without spending an LLM
//! call; verifier-side errors never block the answer, they degrade to a
//! neutral verdict.

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::{CitationCheck, LlmVerification, RetrievalHit, Verification};
use crate::gateway::{ChatRequest, LlmGateway, system_message, user_message};
use crate::scenario::ScenarioConfig;

use crate::agent::{VERIFIER_SYSTEM_PROMPT, build_verification_prompt, parse_json_response};

/// Tokens allowed for the verification response.
const VERIFY_MAX_TOKENS: u32 = 400;
/// Confidence boost when every citation resolves.
const VALID_CITATION_BONUS: f64 = 0.10;
/// Confidence ceiling when any citation fails.
const INVALID_CITATION_CAP: f64 = 0.30;
/// Confidence penalty when the answer cites nothing.
const NO_CITATION_PENALTY: f64 = 0.05;
/// Paragraph-style citations up to this value pass when enough chunks
/// exist.
const TOLERANT_PARAGRAPH_MAX: u64 = 10;

/// Verdict parsed from the verification model.
#[derive(Debug, Clone, Deserialize)]
struct LlmVerdict {
    #[serde(default = "default_true")]
    is_valid: bool,
    #[serde(default = "default_verdict_confidence")]
    confidence: f64,
    #[serde(default)]
    reasoning: String,
}

const fn default_true() -> bool {
    true
}

const fn default_verdict_confidence() -> f64 {
    0.7
}

/// Verifies generated answers against their source chunks.
#[derive(Debug)]
pub struct AnswerVerifier {
    model: String,
    patterns: Vec<Regex>,
}

impl AnswerVerifier {
    /// Creates a verifier using the scenario's citation patterns and the
    /// given verification model. Patterns that fail to compile are logged
    /// and skipped.
    #[must_use]
    pub fn new(model: impl Into<String>, scenario: &ScenarioConfig) -> Self {
        let patterns = scenario
            .citation_patterns
            .iter()
            .filter_map(|source| match Regex::new(source) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!(pattern = source, "skipping citation pattern: {e}");
                    None
                }
            })
            .collect();
        Self {
            model: model.into(),
            patterns,
        }
    }

    /// Verifies an answer against its source chunks.
    ///
    /// Short-circuits: an empty answer or empty context skips verification
    /// entirely; any unresolvable citation fails without an LLM call.
    pub async fn verify_answer(
        &self,
        gateway: &LlmGateway,
        answer: &str,
        source_chunks: &[RetrievalHit],
        question: &str,
    ) -> Verification {
        if answer.is_empty() || source_chunks.is_empty() {
            return Verification::skipped("nothing to verify: answer or source chunks empty");
        }

        let citations = self.extract_citations(answer);
        let invalid: Vec<String> = citations
            .iter()
            .filter(|citation| !citation_exists(citation, source_chunks))
            .cloned()
            .collect();

        if !invalid.is_empty() {
            warn!(invalid = ?invalid, "fabricated citations detected");
            return Verification {
                is_valid: false,
                confidence: 0.2,
                reasoning: format!("fabricated citations detected: {}", invalid.join(", ")),
                citation_check: CitationCheck::Failed,
                invalid_citations: invalid,
                llm_verification: LlmVerification::Skipped,
            };
        }

        let citation_check = if citations.is_empty() {
            CitationCheck::NoCitations
        } else {
            CitationCheck::Passed
        };

        let prompt = build_verification_prompt(question, answer, source_chunks);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![system_message(VERIFIER_SYSTEM_PROMPT), user_message(&prompt)],
            temperature: Some(0.0),
            max_tokens: Some(VERIFY_MAX_TOKENS),
            json_mode: true,
        };

        match gateway.chat(&request).await {
            Ok(response) => {
                let (verdict, parsed) = parse_json_response::<LlmVerdict>(&response.content)
                    .map_or_else(
                        || {
                            (
                                LlmVerdict {
                                    is_valid: true,
                                    confidence: 0.6,
                                    reasoning: "parse_failed".to_string(),
                                },
                                false,
                            )
                        },
                        |v| (v, true),
                    );

                let confidence =
                    combine_confidence(verdict.confidence, !citations.is_empty(), true);
                debug!(
                    is_valid = verdict.is_valid,
                    confidence, "LLM verification complete"
                );
                Verification {
                    is_valid: verdict.is_valid,
                    confidence,
                    reasoning: verdict.reasoning,
                    citation_check,
                    invalid_citations: Vec::new(),
                    llm_verification: if parsed {
                        LlmVerification::Completed
                    } else {
                        LlmVerification::Failed
                    },
                }
            }
            Err(e) => {
                warn!("LLM verification errored, degrading to neutral verdict: {e}");
                Verification {
                    is_valid: true,
                    confidence: 0.5,
                    reasoning: format!("verification error: {e}"),
                    citation_check,
                    invalid_citations: Vec::new(),
                    llm_verification: LlmVerification::Error,
                }
            }
        }
    }

    /// Extracts citation tokens from the answer using the ordered pattern
    /// list, deduplicated in first-seen order.
    #[must_use]
    pub fn extract_citations(&self, answer: &str) -> Vec<String> {
        let mut citations = Vec::new();
        for pattern in &self.patterns {
            for captures in pattern.captures_iter(answer) {
                let token = captures
                    .get(1)
                    .or_else(|| captures.get(0))
                    .map(|m| m.as_str().to_string());
                if let Some(token) = token
                    && !citations.contains(&token)
                {
                    citations.push(token);
                }
            }
        }
        citations
    }
}

/// Checks whether a citation resolves against the source chunks.
///
/// Numeric citations match a chunk's page number, appear inside a chunk
/// ID, or pass the tolerant paragraph rule (value ≤ 10 with at least that
/// many chunks). Non-numeric citations match case-insensitively against
/// chunk text.
#[must_use]
pub fn citation_exists(citation: &str, source_chunks: &[RetrievalHit]) -> bool {
    let digits: String = citation.chars().filter(char::is_ascii_digit).collect();

    if let Ok(value) = digits.parse::<u64>() {
        for chunk in source_chunks {
            if u64::from(chunk.page_number) == value {
                return true;
            }
            if chunk.chunk_id.contains(&value.to_string()) {
                return true;
            }
        }
        return value <= TOLERANT_PARAGRAPH_MAX && source_chunks.len() as u64 >= value;
    }

    let needle = citation.to_uppercase();
    source_chunks
        .iter()
        .any(|chunk| chunk.text.to_uppercase().contains(&needle))
}

/// Combines the LLM confidence with the citation evidence.
///
/// All citations valid lifts confidence by 0.10 (capped at 1.0), any
/// invalid citation caps it at 0.30, and an answer with no citations
/// loses 0.05 (floored at 0.0). Rounded to two decimals.
#[must_use]
pub fn combine_confidence(llm_confidence: f64, has_citations: bool, all_valid: bool) -> f64 {
    let mut confidence = llm_confidence;
    if has_citations && all_valid {
        confidence = (confidence + VALID_CITATION_BONUS).min(1.0);
    }
    if has_citations && !all_valid {
        confidence = confidence.min(INVALID_CITATION_CAP);
    }
    if !has_citations {
        confidence = (confidence - NO_CITATION_PENALTY).max(0.0);
    }
    (confidence * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::core::{RetrievalSource, chunk_id};
    use crate::gateway::{
        ChatResponse, EmbeddingRequest, EmbeddingResponse, LlmProvider, ProviderError, TokenUsage,
    };
    use async_trait::async_trait;
    use std::sync::Arc;

    struct CannedProvider {
        response: Result<String, ProviderError>,
    }

    #[async_trait]
    impl LlmProvider for CannedProvider {
        fn name(&self) -> &'static str {
            "canned"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.response.clone().map(|content| ChatResponse {
                content,
                usage: TokenUsage::default(),
                request_id: None,
            })
        }

        async fn embed(
            &self,
            _request: &EmbeddingRequest,
        ) -> Result<EmbeddingResponse, ProviderError> {
            Err(ProviderError::fatal("unused"))
        }
    }

    fn gateway(response: Result<String, ProviderError>) -> LlmGateway {
        LlmGateway::new(
            Arc::new(CannedProvider { response }),
            GatewayConfig::immediate(),
        )
    }

    fn verifier() -> AnswerVerifier {
        AnswerVerifier::new("qwen-plus", &ScenarioConfig::tender())
    }

    fn chunk(page: u32, text: &str) -> RetrievalHit {
        RetrievalHit {
            chunk_id: chunk_id("f1", (page.saturating_sub(1)) as usize),
            text: text.to_string(),
            page_number: page,
            file_id: "f1".to_string(),
            ordinal: (page.saturating_sub(1)) as usize,
            score: 1.0,
            rank: 1,
            source: RetrievalSource::Hybrid,
            bm25_score: None,
            vector_score: None,
            bm25_rank: None,
            vector_rank: None,
            rrf_score: None,
            needs_expansion: false,
        }
    }

    #[test]
    fn test_extract_citations_page_and_bracket() {
        let v = verifier();
        let citations = v.extract_citations("见第 3 页和第 7 条，另见 [2]。");
        assert_eq!(citations, vec!["3", "7", "2"]);
    }

    #[test]
    fn test_extract_citations_dedupes_in_order() {
        let v = verifier();
        let citations = v.extract_citations("第3页、第3页、第5页");
        assert_eq!(citations, vec!["3", "5"]);
    }

    #[test]
    fn test_extract_citations_appendix() {
        let v = verifier();
        let citations = v.extract_citations("详见附录 B 的清单");
        assert_eq!(citations, vec!["B"]);
    }

    #[test]
    fn test_extract_citations_none() {
        let v = verifier();
        assert!(v.extract_citations("没有任何引用的答案").is_empty());
    }

    #[test]
    fn test_citation_exists_page_match() {
        let chunks = vec![chunk(3, "内容"), chunk(5, "内容")];
        assert!(citation_exists("3", &chunks));
        assert!(citation_exists("5", &chunks));
    }

    #[test]
    fn test_citation_exists_fails_for_unknown_page() {
        // Pages 3 and 5 loaded; "9" is neither a page, nor in a chunk id,
        // nor within the tolerant paragraph range (only 2 chunks exist).
        let chunks = vec![chunk(3, "内容"), chunk(5, "内容")];
        assert!(!citation_exists("9", &chunks));
    }

    #[test]
    fn test_citation_exists_tolerant_paragraph() {
        let chunks: Vec<RetrievalHit> = (1..=4).map(|p| chunk(p, "内容")).collect();
        assert!(citation_exists("4", &chunks));
        assert!(!citation_exists("9", &chunks[..1].to_vec()));
    }

    #[test]
    fn test_citation_exists_chunk_id_match() {
        let chunks = vec![chunk(100, "内容")];
        // chunk_id is "f1#chunk#99"; citation 99 matches it.
        assert!(citation_exists("99", &chunks));
    }

    #[test]
    fn test_citation_exists_non_numeric_text_match() {
        let chunks = vec![chunk(1, "详见附录 B 中的资质要求")];
        assert!(citation_exists("B", &chunks));
        assert!(!citation_exists("Z", &chunks));
    }

    #[test]
    fn test_combine_confidence_rules() {
        // All valid: +0.10 capped at 1.0.
        assert!((combine_confidence(0.8, true, true) - 0.9).abs() < 1e-9);
        assert!((combine_confidence(0.95, true, true) - 1.0).abs() < 1e-9);
        // Any invalid: capped at 0.30.
        assert!((combine_confidence(0.9, true, false) - 0.3).abs() < 1e-9);
        assert!((combine_confidence(0.2, true, false) - 0.2).abs() < 1e-9);
        // No citations: −0.05 floored at 0.0.
        assert!((combine_confidence(0.7, false, true) - 0.65).abs() < 1e-9);
        assert!(combine_confidence(0.0, false, true).abs() < 1e-9);
    }

    #[test]
    fn test_combine_confidence_rounds_two_decimals() {
        let combined = combine_confidence(0.333, false, true);
        assert!((combined - 0.28).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_verify_empty_answer_skips() {
        let gw = gateway(Ok(String::new()));
        let v = verifier();
        let result = v.verify_answer(&gw, "", &[chunk(1, "x")], "q").await;
        assert!(result.is_valid);
        assert!((result.confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(result.citation_check, CitationCheck::Skipped);
        assert_eq!(result.llm_verification, LlmVerification::Skipped);
    }

    #[tokio::test]
    async fn test_verify_empty_chunks_skips() {
        let gw = gateway(Ok(String::new()));
        let v = verifier();
        let result = v.verify_answer(&gw, "some answer", &[], "q").await;
        assert_eq!(result.citation_check, CitationCheck::Skipped);
    }

    #[tokio::test]
    async fn test_verify_invalid_citation_fails_without_llm_call() {
        // The provider would return an error, proving no LLM call happens.
        let gw = gateway(Err(ProviderError::fatal("must not be called")));
        let v = verifier();
        let chunks = vec![chunk(3, "内容"), chunk(5, "内容")];
        let result = v
            .verify_answer(&gw, "答案见第 9 页。", &chunks, "截止时间？")
            .await;
        assert!(!result.is_valid);
        assert!(result.confidence <= 0.30);
        assert!((result.confidence - 0.2).abs() < f64::EPSILON);
        assert_eq!(result.citation_check, CitationCheck::Failed);
        assert_eq!(result.invalid_citations, vec!["9"]);
        assert_eq!(result.llm_verification, LlmVerification::Skipped);
    }

    #[tokio::test]
    async fn test_verify_valid_citations_completed() {
        let gw = gateway(Ok(
            r#"{"is_valid": true, "confidence": 0.8, "reasoning": "grounded"}"#.to_string(),
        ));
        let v = verifier();
        let chunks = vec![chunk(3, "截止时间为三月一日")];
        let result = v
            .verify_answer(&gw, "截止时间见第 3 页。", &chunks, "截止时间？")
            .await;
        assert!(result.is_valid);
        assert_eq!(result.citation_check, CitationCheck::Passed);
        assert_eq!(result.llm_verification, LlmVerification::Completed);
        // 0.8 + 0.10 citation bonus.
        assert!((result.confidence - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_verify_no_citations_penalized() {
        let gw = gateway(Ok(
            r#"{"is_valid": true, "confidence": 0.8, "reasoning": "plausible"}"#.to_string(),
        ));
        let v = verifier();
        let result = v
            .verify_answer(&gw, "答案没有引用。", &[chunk(1, "x")], "q")
            .await;
        assert_eq!(result.citation_check, CitationCheck::NoCitations);
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_verify_parse_failure_defaults() {
        let gw = gateway(Ok("totally not json".to_string()));
        let v = verifier();
        let result = v
            .verify_answer(&gw, "答案见第 1 页。", &[chunk(1, "x")], "q")
            .await;
        assert!(result.is_valid);
        assert_eq!(result.llm_verification, LlmVerification::Failed);
        assert_eq!(result.reasoning, "parse_failed");
        // 0.6 default + 0.10 citation bonus.
        assert!((result.confidence - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_verify_gateway_error_degrades() {
        let gw = gateway(Err(ProviderError::fatal("llm down")));
        let v = verifier();
        let result = v
            .verify_answer(&gw, "答案见第 1 页。", &[chunk(1, "x")], "q")
            .await;
        assert!(result.is_valid);
        assert!((result.confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(result.llm_verification, LlmVerification::Error);
        assert_eq!(result.citation_check, CitationCheck::Passed);
    }
}
