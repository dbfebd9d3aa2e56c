//! On-disk index formats and the in-memory namespace store.
//!
//! Per file, a namespace holds a BM25 bundle (chunk texts, scorer rebuilt
//! on load) and a flat vector index with an aligned `_chunks.json`
//! sidecar. The [`IndexStore`] loads each namespace lazily and shares the
//! immutable snapshot across concurrent requests.

mod bm25;
mod store;
mod vector;

pub use bm25::{Bm25Bundle, Bm25BundleMetadata, Bm25Index, tokenize};
pub use store::{
    BM25_FILE_SUFFIX, Bm25File, CHUNKS_FILE_SUFFIX, IndexStore, NamespaceIndexes,
    VECTOR_FILE_SUFFIX, VectorFile, list_files_with_suffix,
};
pub use vector::{ChunkFile, ChunkMetadata, VectorIndex};
