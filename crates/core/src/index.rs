use crate::error::{IngestError, QueryError};
use crate::models::{ChunkMeta, ChunkRecord};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Immutable in-memory vector index with a parallel metadata array at the
/// same ordinal positions. Built whole, never mutated in place; a rebuild
/// produces a new value that replaces the old one behind a shared reference.
///
/// Scores are cosine similarity (higher = better). Vectors are unit-normalized
/// at build time, so the similarity is a plain dot product.
#[derive(Debug)]
pub struct SearchIndex {
    dimensions: usize,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<ChunkMeta>,
}

#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub meta: ChunkMeta,
    pub similarity: f32,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    dimensions: usize,
    vectors: Vec<Vec<f32>>,
}

impl SearchIndex {
    /// Consumes a complete batch of embedded chunks. Rejects chunks with
    /// missing or dimension-mismatched embeddings so the vector array and
    /// the metadata array can never drift apart.
    pub fn build(chunks: &[ChunkRecord]) -> Result<Self, IngestError> {
        let dimensions = chunks
            .first()
            .map(|chunk| chunk.embedding.len())
            .unwrap_or(0);

        let mut vectors = Vec::with_capacity(chunks.len());
        let mut metadata = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            if chunk.embedding.is_empty() || chunk.embedding.len() != dimensions {
                return Err(IngestError::InvalidArgument(format!(
                    "chunk {} has embedding of length {}, expected {}",
                    chunk.chunk_id,
                    chunk.embedding.len(),
                    dimensions
                )));
            }
            vectors.push(unit_normalize(&chunk.embedding));
            metadata.push(chunk.meta());
        }

        Ok(Self {
            dimensions,
            vectors,
            metadata,
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Exact nearest-neighbor search, best match first, at most `k` results.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Vec<ScoredChunk> {
        if k == 0 || self.vectors.is_empty() || query_vector.len() != self.dimensions {
            return Vec::new();
        }

        let query = unit_normalize(query_vector);
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(ordinal, vector)| (ordinal, dot(&query, vector)))
            .collect();

        scored.sort_by(|left, right| right.1.total_cmp(&left.1));
        scored
            .into_iter()
            .take(k)
            .map(|(ordinal, similarity)| ScoredChunk {
                meta: self.metadata[ordinal].clone(),
                similarity,
            })
            .collect()
    }

    /// Writes the vector file and the metadata file together. Each artifact
    /// goes to a `.tmp` sibling first and is renamed into place only after
    /// both writes succeed, so a concurrent reader sees either the old pair
    /// or the new pair, never a mix.
    pub fn save(&self, index_path: &Path, meta_path: &Path) -> Result<(), IngestError> {
        let index_file = IndexFile {
            dimensions: self.dimensions,
            vectors: self.vectors.clone(),
        };

        let index_tmp = tmp_sibling(index_path);
        let meta_tmp = tmp_sibling(meta_path);

        if let Some(parent) = index_path.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Some(parent) = meta_path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&index_tmp, serde_json::to_vec(&index_file)?)?;
        fs::write(&meta_tmp, serde_json::to_vec(&self.metadata)?)?;

        fs::rename(&index_tmp, index_path)?;
        fs::rename(&meta_tmp, meta_path)?;
        Ok(())
    }

    /// Round-trip counterpart of `save`. A loaded index reproduces identical
    /// search results for the same query vector.
    pub fn load(index_path: &Path, meta_path: &Path) -> Result<Self, QueryError> {
        if !index_path.exists() || !meta_path.exists() {
            return Err(QueryError::IndexNotFound(
                index_path.to_string_lossy().to_string(),
            ));
        }

        let index_bytes = fs::read(index_path)?;
        let meta_bytes = fs::read(meta_path)?;

        let index_file: IndexFile = serde_json::from_slice(&index_bytes)
            .map_err(|error| QueryError::CorruptIndex(error.to_string()))?;
        let metadata: Vec<ChunkMeta> = serde_json::from_slice(&meta_bytes)
            .map_err(|error| QueryError::CorruptIndex(error.to_string()))?;

        if index_file.vectors.len() != metadata.len() {
            return Err(QueryError::CorruptIndex(format!(
                "{} vectors but {} metadata entries",
                index_file.vectors.len(),
                metadata.len()
            )));
        }

        Ok(Self {
            dimensions: index_file.dimensions,
            vectors: index_file.vectors,
            metadata,
        })
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    file_name.push(".tmp");
    path.with_file_name(file_name)
}

fn unit_normalize(vector: &[f32]) -> Vec<f32> {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vector.iter().map(|value| value / magnitude).collect()
    } else {
        vector.to_vec()
    }
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

/// Single-writer guard for a rebuild. Created with create-new semantics on
/// `<index_path>.lock`; a second builder for the same path fails with
/// `BuildInProgress`. Released on drop.
#[derive(Debug)]
pub struct IndexLock {
    path: PathBuf,
}

impl IndexLock {
    pub fn acquire(index_path: &Path) -> Result<Self, IngestError> {
        let path = lock_path(index_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => Err(
                IngestError::BuildInProgress(path.to_string_lossy().to_string()),
            ),
            Err(error) => Err(IngestError::Io(error)),
        }
    }
}

impl Drop for IndexLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn lock_path(index_path: &Path) -> PathBuf {
    let mut file_name = index_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    file_name.push(".lock");
    index_path.with_file_name(file_name)
}
