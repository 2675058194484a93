//! Vector index abstraction and the in-memory implementation.
//!
//! The [`VectorIndex`] trait is the knowledge base's storage seam. Only the
//! orchestrator holds an index, and the two mutating operations
//! ([`add`](VectorIndex::add) and [`clear`](VectorIndex::clear)) take
//! `&mut self` so that ownership alone rules out other writers.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`add`](VectorIndex::add) | Append chunks with their vectors |
//! | [`search`](VectorIndex::search) | Top-k cosine similarity search |
//! | [`count`](VectorIndex::count) | Number of indexed chunks |
//! | [`sources`](VectorIndex::sources) | Distinct source names |
//! | [`clear`](VectorIndex::clear) | Remove everything, rebuilding storage if needed |

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};
use crate::models::{Chunk, ScoredChunk};

/// What a successful [`VectorIndex::clear`] had to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClearOutcome {
    /// Existing storage was emptied in place.
    Cleared,
    /// Storage could not be emptied; a new empty index was built instead.
    Rebuilt { location: String, reason: String },
}

/// Storage backend for chunk vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Dimensionality every stored and query vector must have.
    fn dims(&self) -> usize;

    /// Append chunks and their vectors. Never deduplicates.
    ///
    /// # Errors
    ///
    /// [`RagError::DimensionMismatch`] if `chunks.len() != vectors.len()` or
    /// any vector's length differs from [`dims`](VectorIndex::dims). Nothing
    /// is stored in that case.
    async fn add(&mut self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()>;

    /// Return at most `k` chunks by descending cosine similarity. Ties keep
    /// insertion order. An empty index yields an empty result.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    async fn count(&self) -> Result<usize>;

    async fn sources(&self) -> Result<BTreeSet<String>>;

    /// Remove every chunk. Afterwards `count() == 0`.
    ///
    /// Implementations backed by external storage retry and fall back to a
    /// fresh storage location instead of failing; an `Err` means even the
    /// fallback was impossible.
    async fn clear(&mut self) -> Result<ClearOutcome>;
}

/// Validate an `add` batch against the index dimensionality.
pub fn check_batch(dims: usize, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
        return Err(RagError::dimension_mismatch(
            "one vector per chunk",
            chunks.len(),
            vectors.len(),
        ));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(RagError::dimension_mismatch("chunk vector", dims, bad.len()));
    }
    Ok(())
}

/// Validate a query vector against the index dimensionality.
pub fn check_query(dims: usize, query: &[f32]) -> Result<()> {
    if query.len() != dims {
        return Err(RagError::dimension_mismatch("query vector", dims, query.len()));
    }
    Ok(())
}

/// Rank `(chunk, vector)` candidates against a query, keeping the best `k`.
///
/// The sort is stable, so equal scores stay in the order the candidates
/// were given (insertion order for both backends).
pub fn rank<'a, I>(query: &[f32], candidates: I, k: usize) -> Vec<ScoredChunk>
where
    I: IntoIterator<Item = (&'a Chunk, &'a [f32])>,
{
    if k == 0 {
        return Vec::new();
    }
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .map(|(chunk, vector)| ScoredChunk {
            chunk: chunk.clone(),
            score: cosine_similarity(query, vector),
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}

/// Brute-force in-memory index for tests and ephemeral sessions.
#[derive(Debug)]
pub struct InMemoryIndex {
    dims: usize,
    entries: Vec<(Chunk, Vec<f32>)>,
}

impl InMemoryIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            entries: Vec::new(),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn add(&mut self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_batch(self.dims, chunks, vectors)?;
        self.entries
            .extend(chunks.iter().cloned().zip(vectors.iter().cloned()));
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        check_query(self.dims, query)?;
        Ok(rank(
            query,
            self.entries.iter().map(|(c, v)| (c, v.as_slice())),
            k,
        ))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.len())
    }

    async fn sources(&self) -> Result<BTreeSet<String>> {
        Ok(self
            .entries
            .iter()
            .map(|(c, _)| c.source_name.clone())
            .collect())
    }

    async fn clear(&mut self) -> Result<ClearOutcome> {
        self.entries.clear();
        Ok(ClearOutcome::Cleared)
    }
}
