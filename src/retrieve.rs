//! Query-adaptive retrieval with Maximal Marginal Relevance.
//!
//! Retrieval happens in two stages:
//!
//! 1. **Fetch** the `fetch_k` nearest chunks to the query embedding,
//!    optionally dropping anything below the configured similarity floor.
//! 2. **Select** `k` of them with MMR, trading relevance against
//!    redundancy with the chunks already picked:
//!
//! ```text
//! mmr(c) = λ · sim(q, c) − (1 − λ) · max sim(c, s) for s in selected
//! ```
//!
//! The parameters adapt to the query: long questions and comparisons pull
//! in more, and more varied, context.

use crate::embedding::{self, cosine_similarity, Embedder};
use crate::error::Result;
use crate::index::{Candidate, VectorIndex};
use crate::models::Chunk;

/// Queries with more words than this are treated as complex.
const COMPLEX_QUERY_WORDS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParameters {
    /// Number of chunks returned.
    pub k: usize,
    /// Number of nearest candidates considered before diversification.
    pub fetch_k: usize,
    /// 1.0 is pure relevance, 0.0 pure diversity.
    pub lambda: f32,
    /// Candidates scoring below this cosine similarity are discarded.
    pub similarity_floor: Option<f32>,
}

impl RetrievalParameters {
    /// Derive parameters from the query text. The first matching rule wins:
    ///
    /// | Rule | k | fetch_k | λ |
    /// |------|---|---------|---|
    /// | more than 15 words | 4 | 8 | 0.6 |
    /// | mentions "compare" or "difference" | 4 | 6 | 0.5 |
    /// | otherwise | 3 | 5 | 0.7 |
    pub fn for_query(query: &str) -> Self {
        let lowered = query.to_lowercase();

        let (k, fetch_k, lambda) = if query.split_whitespace().count() > COMPLEX_QUERY_WORDS {
            (4, 8, 0.6)
        } else if lowered.contains("compare") || lowered.contains("difference") {
            (4, 6, 0.5)
        } else {
            (3, 5, 0.7)
        };

        Self {
            k,
            fetch_k,
            lambda,
            similarity_floor: None,
        }
    }

    pub fn with_floor(mut self, floor: Option<f32>) -> Self {
        self.similarity_floor = floor;
        self
    }
}

/// Pick up to `k` candidates by Maximal Marginal Relevance.
///
/// `candidates` must already be ordered by descending query similarity;
/// ties in MMR score go to the earlier candidate.
pub fn mmr_select(candidates: Vec<Candidate>, k: usize, lambda: f32) -> Vec<Candidate> {
    let lambda = lambda.clamp(0.0, 1.0);
    let mut remaining = candidates;
    let mut selected: Vec<Candidate> = Vec::with_capacity(k.min(remaining.len()));

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (idx, candidate) in remaining.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|s| cosine_similarity(&candidate.vector, &s.vector))
                .fold(None, |acc: Option<f32>, sim| Some(acc.map_or(sim, |a| a.max(sim))))
                .unwrap_or(0.0);
            let score = lambda * candidate.score - (1.0 - lambda) * redundancy;

            if score > best_score {
                best_score = score;
                best_idx = idx;
            }
        }

        selected.push(remaining.remove(best_idx));
    }

    selected
}

/// Retrieve context chunks for `query`.
///
/// With no index, or an empty one, this returns nothing and never calls the
/// embedder.
pub async fn retrieve(
    index: Option<&dyn VectorIndex>,
    embedder: &dyn Embedder,
    query: &str,
    params: &RetrievalParameters,
) -> Result<Vec<Chunk>> {
    let Some(index) = index else {
        return Ok(Vec::new());
    };
    if index.stats().await?.total_chunks == 0 {
        return Ok(Vec::new());
    }

    let query_vec = embedding::embed_query(embedder, query).await?;
    let mut candidates = index.nearest(&query_vec, params.fetch_k).await?;

    if let Some(floor) = params.similarity_floor {
        candidates.retain(|c| c.score >= floor);
    }

    let selected = mmr_select(candidates, params.k, params.lambda);
    tracing::debug!(
        k = params.k,
        fetch_k = params.fetch_k,
        lambda = params.lambda,
        selected = selected.len(),
        "retrieved context"
    );

    Ok(selected.into_iter().map(|c| c.chunk).collect())
}
