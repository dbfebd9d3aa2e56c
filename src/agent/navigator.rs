//! Layered navigator: iterative candidate-set narrowing under a token
//! budget.
//!
//! Each round asks the routing agent to keep roughly half of the current
//! set, until the set fits the token budget, gets too small to prune
//! further, or routing stops making progress. After the loop every
//! surviving chunk is checked for truncation and flagged; chunk text is
//! never mutated here.

use tracing::{debug, info};

use crate::core::RetrievalHit;
use crate::gateway::LlmGateway;

use super::routing::RoutingAgent;

/// Stop pruning once the set is at most this many chunks (with the token
/// budget also met).
const TARGET_MAX_CHUNKS: usize = 10;
/// Never prune below this many chunks.
const MIN_CHUNKS: usize = 3;
/// Per-round selection floor.
const MIN_ROUND_TOP_K: usize = 5;
/// Characters of routing reasoning kept per scratchpad line.
const SCRATCHPAD_REASON_CHARS: usize = 50;

/// Outcome of one navigation run.
#[derive(Debug, Clone)]
pub struct Navigation {
    /// Final ordered chunk set, expansion flags populated.
    pub chunks: Vec<RetrievalHit>,
    /// Number of pruning rounds that applied a selection.
    pub rounds: usize,
    /// One reasoning line per applied round.
    pub scratchpad: Vec<String>,
}

/// Iteratively narrows a candidate set with the routing agent.
#[derive(Debug, Clone)]
pub struct LayeredNavigator {
    max_rounds: usize,
    target_tokens: usize,
}

impl LayeredNavigator {
    /// Creates a navigator with the given round and token budgets.
    #[must_use]
    pub const fn new(max_rounds: usize, target_tokens: usize) -> Self {
        Self {
            max_rounds,
            target_tokens,
        }
    }

    /// Narrows `chunks` for the question.
    ///
    /// Routing failures and no-progress selections stop the loop with the
    /// current set, preserving completeness over aggressive pruning. An
    /// empty input yields an empty result.
    pub async fn navigate(
        &self,
        gateway: &LlmGateway,
        routing: &RoutingAgent,
        chunks: Vec<RetrievalHit>,
        question: &str,
    ) -> Navigation {
        if chunks.is_empty() {
            return Navigation {
                chunks,
                rounds: 0,
                scratchpad: Vec::new(),
            };
        }

        let initial_len = chunks.len();
        let mut current = chunks;
        let mut scratchpad: Vec<String> = Vec::new();
        let mut rounds = 0;

        for round in 0..self.max_rounds {
            let total_tokens: usize = current.iter().map(RetrievalHit::token_estimate).sum();

            debug!(
                round = round + 1,
                chunks = current.len(),
                total_tokens,
                "navigation round check"
            );

            if total_tokens <= self.target_tokens && current.len() <= TARGET_MAX_CHUNKS {
                info!(
                    total_tokens,
                    chunks = current.len(),
                    "navigation done: within token and count budget"
                );
                break;
            }
            if current.len() <= MIN_CHUNKS {
                info!(chunks = current.len(), "navigation done: set too small to prune");
                break;
            }

            let top_k = MIN_ROUND_TOP_K.max(current.len() / 2);
            let selection = routing
                .route_documents(gateway, &current, question, &scratchpad.join("\n"), top_k)
                .await;

            if selection.chunks.is_empty() || selection.chunks.len() >= current.len() {
                info!(
                    selected = selection.chunks.len(),
                    current = current.len(),
                    "navigation done: routing made no progress"
                );
                break;
            }

            current = selection.chunks;
            rounds += 1;
            let mut reason: String = selection
                .reasoning
                .chars()
                .take(SCRATCHPAD_REASON_CHARS)
                .collect();
            if reason.len() < selection.reasoning.len() {
                reason.push('…');
            }
            scratchpad.push(format!(
                "round {rounds}: kept {} chunks (confidence {:.2}): {reason}",
                current.len(),
                selection.confidence
            ));
        }

        for chunk in &mut current {
            chunk.needs_expansion = routing.should_expand_context(chunk);
        }

        info!(
            initial = initial_len,
            survivors = current.len(),
            rounds,
            "layered navigation complete"
        );

        Navigation {
            chunks: current,
            rounds,
            scratchpad,
        }
    }
}
