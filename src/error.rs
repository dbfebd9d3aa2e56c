//! Error types for the RAG core.
//!
//! This module provides the error hierarchy using `thiserror` for all core
//! operations: the LLM gateway, index loading, ingestion, caching, and the
//! question pipeline.
//!
//! Foreseeable degradations (empty retrieval, JSON parse failures, a single
//! unreadable index file) are handled with explicit fallback values at the
//! call site and never surface here. The only errors callers see are
//! upstream LLM exhaustion, deadline expiry, validation failures, and
//! ingestion failures.

use thiserror::Error;

/// Result type alias for RAG core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for RAG core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// LLM gateway errors (chat or embedding upstream).
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Index loading or format errors.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Namespace preparation (ingestion) errors.
    #[error("ingestion error: {0}")]
    Ingest(#[from] IngestError),

    /// The request-wide deadline elapsed before an answer was produced.
    #[error("request deadline exceeded after {elapsed_ms}ms")]
    Deadline {
        /// Milliseconds elapsed when the deadline fired.
        elapsed_ms: u64,
    },

    /// Malformed caller input.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the invalid input.
        message: String,
    },

    /// The `(tenant_id, scenario_id)` namespace has no data directory.
    #[error("unknown namespace: {tenant_id}/{scenario_id}")]
    NamespaceUnknown {
        /// Tenant identifier.
        tenant_id: String,
        /// Scenario identifier.
        scenario_id: String,
    },
}

/// Errors from the LLM gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Chat completion failed after exhausting all retry attempts.
    #[error("LLM upstream failed after {attempts} attempts: {message}")]
    Upstream {
        /// Number of attempts made.
        attempts: u32,
        /// Last provider error message.
        message: String,
    },

    /// Embedding request failed after exhausting all retry attempts.
    #[error("embedding failed after {attempts} attempts: {message}")]
    Embedding {
        /// Number of attempts made.
        attempts: u32,
        /// Last provider error message.
        message: String,
    },
}

/// Errors from loading or reading on-disk indices.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Index file could not be read.
    #[error("failed to load index {path}: {reason}")]
    Load {
        /// Path to the index file.
        path: String,
        /// Reason for the failure.
        reason: String,
    },

    /// Index file contents are structurally invalid.
    #[error("corrupt index {path}: {reason}")]
    Corrupt {
        /// Path to the index file.
        path: String,
        /// What was wrong with the contents.
        reason: String,
    },

    /// Vector dimensions do not match across inputs.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension.
        expected: usize,
        /// Actual dimension.
        actual: usize,
    },
}

/// Errors from namespace preparation.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The namespace data directory is missing or unreadable.
    #[error("namespace directory unreadable: {path}: {reason}")]
    Directory {
        /// Path that failed.
        path: String,
        /// Reason for the failure.
        reason: String,
    },

    /// A chunk file failed to parse.
    #[error("chunk file invalid: {path}: {reason}")]
    ChunkFile {
        /// Path to the chunk file.
        path: String,
        /// Reason for the failure.
        reason: String,
    },

    /// Writing a built index to disk failed.
    #[error("failed to write index {path}: {reason}")]
    Write {
        /// Path that failed.
        path: String,
        /// Reason for the failure.
        reason: String,
    },

    /// Embedding the chunk corpus failed.
    #[error("embedding corpus failed: {0}")]
    Embedding(#[from] GatewayError),
}

impl Error {
    /// True when the error is a hard LLM upstream failure.
    #[must_use]
    pub const fn is_upstream(&self) -> bool {
        matches!(self, Self::Gateway(GatewayError::Upstream { .. }))
    }
}
