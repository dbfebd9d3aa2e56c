//! In-memory index store keyed by namespace.
//!
//! Indices are loaded lazily on the first query for a namespace and held
//! behind an `Arc` so concurrent requests share one immutable snapshot.
//! Loading and eviction take the single writer lock; reads clone the
//! `Arc` and drop the lock immediately.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::core::Namespace;
use crate::error::IndexError;

use super::bm25::{Bm25Bundle, Bm25Index};
use super::vector::{ChunkFile, VectorIndex};

/// Suffix of vector index files.
pub const VECTOR_FILE_SUFFIX: &str = "_vector.bin";
/// Suffix of chunk sidecar files.
pub const CHUNKS_FILE_SUFFIX: &str = "_chunks.json";
/// Suffix of BM25 bundle files.
pub const BM25_FILE_SUFFIX: &str = ".bm25.json";

/// One file's lexical index and its aligned chunk texts.
#[derive(Debug, Clone)]
pub struct Bm25File {
    /// Rebuilt Okapi scorer.
    pub index: Bm25Index,
    /// Ordered chunk texts.
    pub chunks: Vec<String>,
}

/// One file's vector index and its aligned chunks/metadata.
#[derive(Debug, Clone)]
pub struct VectorFile {
    /// Flat inner-product index.
    pub index: VectorIndex,
    /// Ordered chunk texts and page metadata.
    pub chunk_file: ChunkFile,
}

/// All indices loaded for one namespace.
///
/// `BTreeMap` keeps file iteration order deterministic, which the
/// retriever tie-breaks rely on.
#[derive(Debug, Default)]
pub struct NamespaceIndexes {
    /// BM25 indices by file ID.
    pub bm25: BTreeMap<String, Bm25File>,
    /// Vector indices by file ID.
    pub vector: BTreeMap<String, VectorFile>,
}

impl NamespaceIndexes {
    /// Total number of loaded per-file indices.
    #[must_use]
    pub fn indices_loaded(&self) -> usize {
        self.bm25.len() + self.vector.len()
    }

    /// True when nothing is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bm25.is_empty() && self.vector.is_empty()
    }
}

/// Process-wide index store.
///
/// Every lookup is keyed by [`Namespace`]; nothing loaded for one tenant
/// is reachable from another tenant's requests.
#[derive(Debug)]
pub struct IndexStore {
    root: PathBuf,
    namespaces: RwLock<HashMap<Namespace, Arc<NamespaceIndexes>>>,
}

impl IndexStore {
    /// Creates a store over the given data root.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    /// Data root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the namespace's indices, loading them from disk on first
    /// access.
    ///
    /// Unreadable individual files are logged and skipped; a namespace
    /// with no readable files at all yields an empty snapshot rather than
    /// an error (the pipeline falls back to pure-LLM mode).
    #[must_use]
    pub fn get_or_load(&self, namespace: &Namespace) -> Arc<NamespaceIndexes> {
        if let Ok(guard) = self.namespaces.read()
            && let Some(existing) = guard.get(namespace)
        {
            return Arc::clone(existing);
        }

        let loaded = Arc::new(self.load_namespace(namespace));

        if let Ok(mut guard) = self.namespaces.write() {
            // Another task may have loaded concurrently; first writer wins
            // so all readers share one snapshot.
            return Arc::clone(
                guard
                    .entry(namespace.clone())
                    .or_insert_with(|| Arc::clone(&loaded)),
            );
        }
        loaded
    }

    /// Drops the cached snapshot so the next access reloads from disk.
    pub fn evict(&self, namespace: &Namespace) {
        if let Ok(mut guard) = self.namespaces.write() {
            guard.remove(namespace);
        }
    }

    /// Indices currently loaded for a namespace, without triggering a load.
    #[must_use]
    pub fn loaded_count(&self, namespace: &Namespace) -> usize {
        self.namespaces
            .read()
            .ok()
            .and_then(|guard| guard.get(namespace).map(|ns| ns.indices_loaded()))
            .unwrap_or(0)
    }

    fn load_namespace(&self, namespace: &Namespace) -> NamespaceIndexes {
        let mut indexes = NamespaceIndexes::default();

        let bm25_dir = namespace.bm25_dir(&self.root);
        for (file_id, path) in list_files_with_suffix(&bm25_dir, BM25_FILE_SUFFIX) {
            match Bm25Bundle::load(&path) {
                Ok(bundle) => {
                    let index = Bm25Index::build(&bundle.chunks);
                    indexes.bm25.insert(
                        file_id,
                        Bm25File {
                            index,
                            chunks: bundle.chunks,
                        },
                    );
                }
                Err(e) => warn!(namespace = %namespace, path = %path.display(), "skipping BM25 bundle: {e}"),
            }
        }

        let vector_dir = namespace.vector_dir(&self.root);
        for (file_id, path) in list_files_with_suffix(&vector_dir, VECTOR_FILE_SUFFIX) {
            let chunks_path = vector_dir.join(format!("{file_id}{CHUNKS_FILE_SUFFIX}"));
            let loaded = VectorIndex::load(&path).and_then(|index| {
                let chunk_file = ChunkFile::load(&chunks_path)?;
                if chunk_file.chunks.len() != index.ntotal() {
                    return Err(IndexError::Corrupt {
                        path: chunks_path.display().to_string(),
                        reason: format!(
                            "{} chunks for {} vectors",
                            chunk_file.chunks.len(),
                            index.ntotal()
                        ),
                    });
                }
                Ok(VectorFile { index, chunk_file })
            });
            match loaded {
                Ok(vector_file) => {
                    indexes.vector.insert(file_id, vector_file);
                }
                Err(e) => warn!(namespace = %namespace, path = %path.display(), "skipping vector index: {e}"),
            }
        }

        debug!(
            namespace = %namespace,
            bm25 = indexes.bm25.len(),
            vector = indexes.vector.len(),
            "namespace indices loaded"
        );
        indexes
    }
}

/// Lists `(file_id, path)` pairs for files in `dir` ending in `suffix`.
///
/// A missing directory yields an empty list.
pub fn list_files_with_suffix(dir: &Path, suffix: &str) -> Vec<(String, PathBuf)> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut files: Vec<(String, PathBuf)> = entries
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            let name = path.file_name()?.to_str()?;
            let file_id = name.strip_suffix(suffix)?;
            Some((file_id.to_string(), path.clone()))
        })
        .collect();
    files.sort();
    files
}
