//! LLM-driven agents: query analysis, document routing, and layered
//! navigation.
//!
//! # Architecture
//!
//! ```text
//! Question → RoutingAgent::analyze_query      (classification + keywords)
//! Hits     → RoutingAgent::route_documents    (first LLM selection)
//!          → LayeredNavigator::navigate       (iterative pruning under a
//!                                              token budget, re-invoking
//!                                              route_documents per round)
//! ```
//!
//! Every LLM decision degrades to a deterministic fallback, so this layer
//! never fails a request on its own.

mod navigator;
mod prompt;
mod routing;

pub use navigator::{LayeredNavigator, Navigation};
pub use prompt::{
    ANALYSIS_SYSTEM_PROMPT, ROUTING_SYSTEM_PROMPT, VERIFIER_SYSTEM_PROMPT, build_analysis_prompt,
    build_answer_prompt, build_routing_prompt, build_verification_prompt,
    format_chunks_for_routing, parse_json_response,
};
pub use routing::{RoutedSelection, RoutingAgent};
