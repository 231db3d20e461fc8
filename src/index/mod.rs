//! Similarity-searchable chunk index.
//!
//! The [`VectorIndex`] trait defines what the ingestion and retrieval
//! pipeline needs from storage; [`IndexStorage`] owns an index's lifecycle
//! (reopen, lazy creation, destruction on reset). Two backends exist:
//!
//! | Backend | Persistence | Used by |
//! |---------|-------------|---------|
//! | [`sqlite::SqliteStorage`] | `index.sqlite` under the configured directory | CLI |
//! | [`memory::MemoryStorage`] | none (process lifetime) | tests, embedding hosts |
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

use std::collections::HashSet;

use async_trait::async_trait;

use crate::embedding::{self, Embedder};
use crate::error::{QaError, Result};
use crate::models::Chunk;

/// A chunk together with its embedding vector, as stored in the index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A nearest-neighbour hit. Carries the stored vector so the retriever can
/// compare candidates with each other without another round-trip.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub total_chunks: usize,
    pub total_sources: usize,
}

/// Abstract chunk index.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`insert`](VectorIndex::insert) | Atomically add a batch of embedded chunks |
/// | [`stats`](VectorIndex::stats) | Chunk and source counts |
/// | [`nearest`](VectorIndex::nearest) | Cosine-similarity search |
/// | [`known_hashes`](VectorIndex::known_hashes) | Content hashes already stored for a source |
/// | [`close`](VectorIndex::close) | Release storage handles |
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embedding model the stored vectors were produced with.
    fn model(&self) -> &str;

    /// Dimensionality of the stored vectors.
    fn dims(&self) -> usize;

    /// Insert every entry or none of them.
    async fn insert(&self, entries: &[IndexEntry]) -> Result<()>;

    async fn stats(&self) -> Result<IndexStats>;

    /// Return up to `limit` entries ordered by descending similarity to
    /// `query`. Ties keep insertion order.
    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Candidate>>;

    async fn known_hashes(&self, source: &str) -> Result<HashSet<String>>;

    async fn close(&self);
}

/// Lifecycle of the single index a session works with.
#[async_trait]
pub trait IndexStorage: Send + Sync {
    /// Reopen a previously persisted index, or `None` if there is none.
    async fn open(&self) -> Result<Option<Box<dyn VectorIndex>>>;

    /// Create a fresh, empty index.
    async fn create(&self, model: &str, dims: usize) -> Result<Box<dyn VectorIndex>>;

    /// Remove the index and everything persisted for it.
    async fn destroy(&self) -> Result<()>;
}

/// Embed `chunks` and insert them into `index` as one atomic batch.
///
/// Embeddings are buffered for the whole batch before anything is written,
/// so an embedding failure leaves the index untouched. Returns the number of
/// chunks inserted.
pub async fn embed_and_insert(
    index: &dyn VectorIndex,
    embedder: &dyn Embedder,
    chunks: Vec<Chunk>,
    batch_size: usize,
) -> Result<usize> {
    if chunks.is_empty() {
        return Ok(0);
    }
    if embedder.dims() != index.dims() {
        return Err(QaError::Configuration(format!(
            "index holds {}-dimensional vectors but the embedder produces {}",
            index.dims(),
            embedder.dims()
        )));
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedding::embed_all(embedder, &texts, batch_size).await?;

    let entries: Vec<IndexEntry> = chunks
        .into_iter()
        .zip(vectors)
        .map(|(chunk, vector)| IndexEntry { chunk, vector })
        .collect();

    index.insert(&entries).await?;
    Ok(entries.len())
}

/// Sort candidates by descending score, keeping insertion order on ties,
/// and keep the first `limit`.
pub(crate) fn rank_candidates(mut candidates: Vec<Candidate>, limit: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(limit);
    candidates
}
