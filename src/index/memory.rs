//! In-memory [`VectorIndex`] for tests and embedding hosts.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`; search is brute-force
//! cosine similarity. [`MemoryStorage`] keeps the live index so a later
//! [`open`](IndexStorage::open) sees the same data, mimicking a reload.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::{QaError, Result};

use super::{rank_candidates, Candidate, IndexEntry, IndexStats, IndexStorage, VectorIndex};

fn poisoned() -> QaError {
    QaError::Index("in-memory index lock poisoned".to_string())
}

/// In-memory index. Clones share the same entries.
#[derive(Clone)]
pub struct InMemoryIndex {
    model: String,
    dims: usize,
    entries: Arc<RwLock<Vec<IndexEntry>>>,
}

impl InMemoryIndex {
    pub fn new(model: &str, dims: usize) -> Self {
        Self {
            model: model.to_string(),
            dims,
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    fn model(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn insert(&self, entries: &[IndexEntry]) -> Result<()> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != self.dims) {
            return Err(QaError::Index(format!(
                "vector for chunk {} has {} dimensions, index expects {}",
                bad.chunk.id,
                bad.vector.len(),
                self.dims
            )));
        }
        let mut stored = self.entries.write().map_err(|_| poisoned())?;
        stored.extend_from_slice(entries);
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let stored = self.entries.read().map_err(|_| poisoned())?;
        let sources: HashSet<&str> = stored.iter().map(|e| e.chunk.source.as_str()).collect();
        Ok(IndexStats {
            total_chunks: stored.len(),
            total_sources: sources.len(),
        })
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Candidate>> {
        let stored = self.entries.read().map_err(|_| poisoned())?;
        let candidates = stored
            .iter()
            .map(|e| Candidate {
                chunk: e.chunk.clone(),
                vector: e.vector.clone(),
                score: cosine_similarity(query, &e.vector),
            })
            .collect();
        Ok(rank_candidates(candidates, limit))
    }

    async fn known_hashes(&self, source: &str) -> Result<HashSet<String>> {
        let stored = self.entries.read().map_err(|_| poisoned())?;
        Ok(stored
            .iter()
            .filter(|e| e.chunk.source == source)
            .map(|e| e.chunk.hash.clone())
            .collect())
    }

    async fn close(&self) {}
}

/// Storage whose "persisted" index lives as long as the storage value.
#[derive(Default)]
pub struct MemoryStorage {
    current: Mutex<Option<InMemoryIndex>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IndexStorage for MemoryStorage {
    async fn open(&self) -> Result<Option<Box<dyn VectorIndex>>> {
        let current = self.current.lock().map_err(|_| poisoned())?;
        Ok(current
            .clone()
            .map(|index| Box::new(index) as Box<dyn VectorIndex>))
    }

    async fn create(&self, model: &str, dims: usize) -> Result<Box<dyn VectorIndex>> {
        let index = InMemoryIndex::new(model, dims);
        *self.current.lock().map_err(|_| poisoned())? = Some(index.clone());
        Ok(Box::new(index))
    }

    async fn destroy(&self) -> Result<()> {
        *self.current.lock().map_err(|_| poisoned())? = None;
        Ok(())
    }
}
