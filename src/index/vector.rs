//! Dense-vector index: flat inner product over L2-normalized vectors.
//!
//! Vectors are pre-normalized at build time so inner product equals cosine
//! similarity; search is exact brute force. The on-disk format is a small
//! header followed by row-major little-endian f32 data, read back through
//! a memory map.

// Memory mapping requires unsafe but is safe for read-only access.
#![allow(unsafe_code)]

use std::fs;
use std::io::Write;
use std::path::Path;

use memmap2::Mmap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// File magic for the vector index format.
const MAGIC: [u8; 4] = *b"RAGV";
/// Current format version.
const FORMAT_VERSION: u32 = 1;
/// Header bytes: magic + version + dim + count.
const HEADER_LEN: usize = 16;
/// Tolerance on `|‖v‖² − 1|` for stored vectors.
const NORM_TOLERANCE: f32 = 1e-5;

/// Flat inner-product index over one file's chunk vectors.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dim: usize,
    /// Row-major vector data, `count * dim` values.
    data: Vec<f32>,
}

impl VectorIndex {
    /// Builds an index from pre-normalized vectors.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::DimensionMismatch`] when rows disagree on
    /// dimension and [`IndexError::Corrupt`] when a vector is not unit
    /// length.
    pub fn from_vectors(vectors: &[Vec<f32>]) -> Result<Self, IndexError> {
        let Some(first) = vectors.first() else {
            return Ok(Self {
                dim: 0,
                data: Vec::new(),
            });
        };

        let dim = first.len();
        let mut data = Vec::with_capacity(vectors.len() * dim);
        for vector in vectors {
            if vector.len() != dim {
                return Err(IndexError::DimensionMismatch {
                    expected: dim,
                    actual: vector.len(),
                });
            }
            let norm_sq: f32 = vector.iter().map(|x| x * x).sum();
            if (norm_sq - 1.0).abs() >= NORM_TOLERANCE {
                return Err(IndexError::Corrupt {
                    path: "<memory>".to_string(),
                    reason: format!("vector norm² {norm_sq} outside unit tolerance"),
                });
            }
            data.extend_from_slice(vector);
        }

        Ok(Self { dim, data })
    }

    /// Number of stored vectors.
    #[must_use]
    pub fn ntotal(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    /// Vector dimension.
    #[must_use]
    pub const fn dim(&self) -> usize {
        self.dim
    }

    /// Top-`k` rows by inner product with the query, similarity descending;
    /// equal similarities order by row index.
    ///
    /// Returns fewer than `k` results when fewer vectors are stored.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize) -> Vec<(usize, f32)> {
        if query.len() != self.dim || self.dim == 0 || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f32)> = self
            .data
            .par_chunks_exact(self.dim)
            .enumerate()
            .map(|(row, vector)| {
                let dot: f32 = vector.iter().zip(query.iter()).map(|(a, b)| a * b).sum();
                (row, dot)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        scored
    }

    /// Writes the index to disk.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Load`] when writing fails.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let io_err = |e: std::io::Error| IndexError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let mut file = fs::File::create(path).map_err(io_err)?;
        file.write_all(&MAGIC).map_err(io_err)?;
        file.write_all(&FORMAT_VERSION.to_le_bytes()).map_err(io_err)?;
        #[allow(clippy::cast_possible_truncation)]
        file.write_all(&(self.dim as u32).to_le_bytes()).map_err(io_err)?;
        #[allow(clippy::cast_possible_truncation)]
        file.write_all(&(self.ntotal() as u32).to_le_bytes())
            .map_err(io_err)?;

        let mut bytes = Vec::with_capacity(self.data.len() * 4);
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        file.write_all(&bytes).map_err(io_err)
    }

    /// Reads an index from disk through a memory map and validates the
    /// stored-vector norm invariant.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Load`] when the file cannot be opened and
    /// [`IndexError::Corrupt`] on format or invariant violations.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let path_str = path.display().to_string();
        let file = fs::File::open(path).map_err(|e| IndexError::Load {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;
        // Safety: the map is read-only and the file is not mutated while
        // mapped.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| IndexError::Load {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let corrupt = |reason: String| IndexError::Corrupt {
            path: path_str.clone(),
            reason,
        };

        if mmap.len() < HEADER_LEN {
            return Err(corrupt(format!("file too short: {} bytes", mmap.len())));
        }
        if mmap[0..4] != MAGIC {
            return Err(corrupt("bad magic".to_string()));
        }
        let version = u32::from_le_bytes([mmap[4], mmap[5], mmap[6], mmap[7]]);
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {version}")));
        }
        let dim = u32::from_le_bytes([mmap[8], mmap[9], mmap[10], mmap[11]]) as usize;
        let count = u32::from_le_bytes([mmap[12], mmap[13], mmap[14], mmap[15]]) as usize;

        let expected_len = HEADER_LEN + count * dim * 4;
        if mmap.len() != expected_len {
            return Err(corrupt(format!(
                "expected {expected_len} bytes for {count}x{dim}, found {}",
                mmap.len()
            )));
        }

        let mut data = Vec::with_capacity(count * dim);
        for chunk in mmap[HEADER_LEN..].chunks_exact(4) {
            data.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }

        for (row, vector) in data.chunks_exact(dim.max(1)).enumerate() {
            let norm_sq: f32 = vector.iter().map(|x| x * x).sum();
            if (norm_sq - 1.0).abs() >= NORM_TOLERANCE {
                return Err(corrupt(format!("vector {row} norm² {norm_sq} not unit")));
            }
        }

        Ok(Self { dim, data })
    }
}

/// The `*_chunks.json` sidecar: chunk texts plus index-aligned metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkFile {
    /// Ordered chunk texts, aligned with the vector index rows.
    pub chunks: Vec<String>,
    /// Per-chunk metadata, aligned with `chunks`.
    #[serde(default)]
    pub chunk_metadata: Vec<ChunkMetadata>,
}

/// Metadata for one chunk. Unknown fields from ingestion are dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// 1-based page number, 0 when unknown.
    #[serde(default)]
    pub page_number: u32,
}

impl ChunkFile {
    /// Reads a chunk file.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Load`] when the file cannot be read and
    /// [`IndexError::Corrupt`] when it does not parse.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let bytes = fs::read(path).map_err(|e| IndexError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| IndexError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Writes the chunk file as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Load`] when the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let json = serde_json::to_vec(self).map_err(|e| IndexError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::write(path, json).map_err(|e| IndexError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Page number for a chunk ordinal, falling back to `ordinal + 1`
    /// when metadata is missing or reports 0.
    #[must_use]
    pub fn page_number(&self, ordinal: usize) -> u32 {
        #[allow(clippy::cast_possible_truncation)]
        let fallback = (ordinal + 1) as u32;
        self.chunk_metadata
            .get(ordinal)
            .map_or(fallback, |m| if m.page_number == 0 { fallback } else { m.page_number })
    }
}
