//! LLM-driven query analysis and document-chunk selection.
//!
//! Every LLM decision here has a deterministic fallback: analysis falls
//! back to marker- and keyword-library rules, routing falls back to the
//! top of the incoming ranking. The pipeline never stalls on a malformed
//! model response.

use std::sync::Arc;

use tracing::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;

use crate::core::{Difficulty, QueryAnalysis, QuestionType, RetrievalHit, RoutingDecision};
use crate::gateway::{ChatRequest, LlmGateway, system_message, user_message};
use crate::scenario::ScenarioConfig;

use super::prompt::{
    ANALYSIS_SYSTEM_PROMPT, ROUTING_SYSTEM_PROMPT, build_analysis_prompt, build_routing_prompt,
    format_chunks_for_routing, parse_json_response,
};

/// Maximum keywords carried in a query analysis.
const MAX_KEYWORDS: usize = 5;
/// Tokens allowed for the analysis response.
const ANALYSIS_MAX_TOKENS: u32 = 500;
/// Tokens allowed for the routing response.
const ROUTING_MAX_TOKENS: u32 = 400;
/// Confidence reported when all candidates fit without an LLM call.
const PASSTHROUGH_CONFIDENCE: f64 = 0.9;
/// Confidence reported by the top-k routing fallback.
const FALLBACK_CONFIDENCE: f64 = 0.7;
/// Chunks shorter than this are flagged for context expansion.
const SHORT_CHUNK_CHARS: usize = 100;

/// The routing agent's chunk selection, with provenance.
#[derive(Debug, Clone)]
pub struct RoutedSelection {
    /// Selected chunks, in selection order.
    pub chunks: Vec<RetrievalHit>,
    /// Why these chunks were selected.
    pub reasoning: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Whether the model asked for surrounding context.
    pub should_expand: bool,
}

/// LLM-driven router over retrieval candidates.
#[derive(Debug)]
pub struct RoutingAgent {
    model: String,
    scenario: Arc<ScenarioConfig>,
}

impl RoutingAgent {
    /// Creates a routing agent using the given fast model.
    #[must_use]
    pub fn new(model: impl Into<String>, scenario: Arc<ScenarioConfig>) -> Self {
        Self {
            model: model.into(),
            scenario,
        }
    }

    /// Analyzes a question, falling back to rule-based classification when
    /// the model call or its JSON fails.
    pub async fn analyze_query(&self, gateway: &LlmGateway, question: &str) -> QueryAnalysis {
        let prompt = build_analysis_prompt(&self.scenario.display_name, question);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                system_message(ANALYSIS_SYSTEM_PROMPT),
                user_message(&prompt),
            ],
            temperature: Some(0.0),
            max_tokens: Some(ANALYSIS_MAX_TOKENS),
            json_mode: true,
        };

        let mut analysis = match gateway.chat(&request).await {
            Ok(response) => parse_json_response::<QueryAnalysis>(&response.content)
                .unwrap_or_else(|| {
                    warn!("query analysis JSON unusable, applying rule-based fallback");
                    self.rule_based_analysis(question)
                }),
            Err(e) => {
                warn!("query analysis call failed, applying rule-based fallback: {e}");
                self.rule_based_analysis(question)
            }
        };

        self.augment_keywords(&mut analysis, question);
        debug!(
            question_type = ?analysis.question_type,
            keywords = ?analysis.keywords,
            "query analysis complete"
        );
        analysis
    }

    /// Selects up to `top_k` chunks for the question.
    ///
    /// Small candidate sets pass through without an LLM call. Any routing
    /// failure degrades to the first `top_k` candidates.
    pub async fn route_documents(
        &self,
        gateway: &LlmGateway,
        chunks: &[RetrievalHit],
        question: &str,
        history: &str,
        top_k: usize,
    ) -> RoutedSelection {
        if chunks.is_empty() {
            return RoutedSelection {
                chunks: Vec::new(),
                reasoning: "no candidate chunks".to_string(),
                confidence: 0.0,
                should_expand: false,
            };
        }

        if chunks.len() <= top_k {
            return RoutedSelection {
                chunks: chunks.to_vec(),
                reasoning: "candidate set already within budget".to_string(),
                confidence: PASSTHROUGH_CONFIDENCE,
                should_expand: false,
            };
        }

        let chunks_block = format_chunks_for_routing(chunks);
        let prompt = build_routing_prompt(
            &self.scenario.display_name,
            question,
            &chunks_block,
            history,
            top_k,
        );
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![system_message(ROUTING_SYSTEM_PROMPT), user_message(&prompt)],
            temperature: Some(0.0),
            max_tokens: Some(ROUTING_MAX_TOKENS),
            json_mode: true,
        };

        let decision = match gateway.chat(&request).await {
            Ok(response) => parse_json_response::<RoutingDecision>(&response.content),
            Err(e) => {
                warn!("routing call failed: {e}");
                None
            }
        };

        let Some(decision) = decision else {
            return Self::fallback_selection(chunks, top_k);
        };

        let selected: Vec<RetrievalHit> = decision
            .selected_indices
            .iter()
            .take(top_k)
            .filter_map(|&i| chunks.get(i).cloned())
            .collect();

        if selected.is_empty() {
            warn!("routing selected no valid indices, applying top-k fallback");
            return Self::fallback_selection(chunks, top_k);
        }

        debug!(
            candidates = chunks.len(),
            selected = selected.len(),
            confidence = decision.confidence,
            "document routing complete"
        );

        RoutedSelection {
            chunks: selected,
            reasoning: decision.reasoning,
            confidence: decision.confidence.clamp(0.0, 1.0),
            should_expand: decision.should_expand,
        }
    }

    /// True when the chunk looks truncated and neighboring context would
    /// help: ellipsis or configured non-terminal punctuation at the end,
    /// very short text, or an explicit continuation marker.
    #[must_use]
    pub fn should_expand_context(&self, chunk: &RetrievalHit) -> bool {
        let text = chunk.text.trim_end();
        if text.ends_with('…') || text.ends_with("...") {
            return true;
        }
        if self
            .scenario
            .non_terminal_suffixes
            .iter()
            .any(|suffix| text.ends_with(suffix.as_str()))
        {
            return true;
        }
        if text.graphemes(true).count() < SHORT_CHUNK_CHARS {
            return true;
        }
        self.scenario
            .continuation_markers
            .iter()
            .any(|marker| text.contains(marker.as_str()))
    }

    /// Marker- and keyword-library-based analysis, used when the LLM is
    /// unavailable or returns an unusable response.
    fn rule_based_analysis(&self, question: &str) -> QueryAnalysis {
        let question_type = if self
            .scenario
            .guidance_markers
            .iter()
            .any(|m| question.contains(m.as_str()))
        {
            QuestionType::Guidance
        } else if self
            .scenario
            .analysis_markers
            .iter()
            .any(|m| question.contains(m.as_str()))
        {
            QuestionType::Analysis
        } else {
            QuestionType::Fact
        };

        let mut keywords = self.scenario.matched_keywords(question);
        keywords.truncate(MAX_KEYWORDS);
        if keywords.is_empty() {
            keywords.push(question.graphemes(true).take(10).collect());
        }

        QueryAnalysis {
            question_type,
            keywords,
            difficulty: Difficulty::Medium,
            category: "general".to_string(),
        }
    }

    /// Adds scenario-library keywords found in the question, never
    /// replacing LLM-extracted ones, capped at [`MAX_KEYWORDS`].
    fn augment_keywords(&self, analysis: &mut QueryAnalysis, question: &str) {
        for word in self.scenario.matched_keywords(question) {
            if analysis.keywords.len() >= MAX_KEYWORDS {
                break;
            }
            if !analysis.keywords.contains(&word) {
                analysis.keywords.push(word);
            }
        }
        analysis.keywords.truncate(MAX_KEYWORDS);
    }

    fn fallback_selection(chunks: &[RetrievalHit], top_k: usize) -> RoutedSelection {
        RoutedSelection {
            chunks: chunks.iter().take(top_k).cloned().collect(),
            reasoning: "routing unavailable, returning top-ranked candidates".to_string(),
            confidence: FALLBACK_CONFIDENCE,
            should_expand: false,
        }
    }
}
