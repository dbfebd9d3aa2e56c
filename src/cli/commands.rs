//! Command dispatch for the CLI binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::config::RagConfig;
use crate::gateway::OpenAiProvider;
use crate::pipeline::Orchestrator;

use super::parser::{Cli, Commands};

/// Output rendering for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses the `--format` flag, defaulting to text.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Executes the parsed CLI command and returns its rendered output.
///
/// # Errors
///
/// Returns an error when configuration is incomplete (missing API key)
/// or the pipeline surfaces a hard failure.
pub async fn execute(cli: &Cli) -> anyhow::Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let orchestrator = build_orchestrator(cli.data_root.clone())?;

    match &cli.command {
        Commands::Ask {
            tenant,
            scenario,
            question,
        } => {
            let record = orchestrator
                .process_question(tenant, scenario, question, None)
                .await?;
            match format {
                OutputFormat::Json => Ok(serde_json::to_string_pretty(&record)?),
                OutputFormat::Text => {
                    let pages = record
                        .relevant_pages
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", ");
                    Ok(format!(
                        "{}\n\nmode: {:?}  confidence: {:.2}  pages: [{pages}]  {}ms\n",
                        record.answer,
                        record.mode,
                        record.confidence,
                        record.processing_time_ms
                    ))
                }
            }
        }
        Commands::Prepare {
            tenant,
            scenario,
            force,
        } => {
            let report = orchestrator
                .prepare_namespace(tenant, scenario, *force)
                .await?;
            match format {
                OutputFormat::Json => Ok(serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => Ok(format!(
                    "parsed {} chunk files, {} indices loaded in {}ms\n",
                    report.parsed, report.indexed, report.total_time_ms
                )),
            }
        }
        Commands::Status { tenant, scenario } => {
            let status = orchestrator.get_status(tenant, scenario);
            match format {
                OutputFormat::Json => Ok(serde_json::to_string_pretty(&status)?),
                OutputFormat::Text => Ok(format!(
                    "indices loaded: {}\ncache: {} exact hits, {} semantic hits, {} misses ({:.0}% hit rate)\nretrieval: {} queries, {:.1}ms avg, {} hybrid / {} bm25-only / {} vector-only / {} failed\n",
                    status.indices_loaded,
                    status.cache_stats.exact_hits,
                    status.cache_stats.semantic_hits,
                    status.cache_stats.misses,
                    status.cache_stats.hit_rate * 100.0,
                    status.retrieval_stats.total_queries,
                    status.retrieval_stats.avg_time_ms,
                    status.retrieval_stats.hybrid,
                    status.retrieval_stats.bm25_only,
                    status.retrieval_stats.vector_only,
                    status.retrieval_stats.failed
                )),
            }
        }
    }
}

fn build_orchestrator(data_root: Option<PathBuf>) -> anyhow::Result<Orchestrator> {
    let api_key = std::env::var("OPENAI_API_KEY")
        .or_else(|_| std::env::var("RAGCORE_API_KEY"))
        .context("set OPENAI_API_KEY or RAGCORE_API_KEY")?;
    let base_url = std::env::var("OPENAI_BASE_URL")
        .or_else(|_| std::env::var("RAGCORE_BASE_URL"))
        .ok();

    let mut builder = RagConfig::builder().from_env();
    if let Some(root) = data_root {
        builder = builder.data_root(root);
    }
    let config = builder.build()?;

    let provider = Arc::new(OpenAiProvider::new(&api_key, base_url.as_deref()));
    Ok(Orchestrator::new(config, provider))
}
