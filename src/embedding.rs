//! Embedding provider abstraction and the OpenAI-compatible implementation.
//!
//! Defines the [`Embedder`] trait and [`OpenAIEmbedder`], which calls
//! `POST {base_url}/embeddings` with batching, retry, and backoff.
//!
//! Also provides the vector utilities used by the index and the retriever:
//! - [`cosine_similarity`]: similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`]: decode a SQLite BLOB back into a `Vec<f32>`

use async_trait::async_trait;
use serde_json::Value;

use crate::config::EmbeddingConfig;
use crate::error::{QaError, Result};
use crate::http::ApiClient;

/// Converts text into fixed-dimensionality vectors.
///
/// Implementations must be safe to share across sessions: they hold
/// configuration only, never per-session state.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a batch of texts, returning one vector per input in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    embedder
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| QaError::EmbeddingService("empty embedding response".to_string()))
}

/// Embed `texts` in batches of `batch_size`, buffering every vector.
///
/// Nothing is returned unless all batches succeed, so callers can commit
/// the whole set or nothing.
pub async fn embed_all(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size.max(1)) {
        let batch_vectors = embedder.embed(batch).await?;
        if batch_vectors.len() != batch.len() {
            return Err(QaError::EmbeddingService(format!(
                "expected {} embeddings, got {}",
                batch.len(),
                batch_vectors.len()
            )));
        }
        vectors.extend(batch_vectors);
        tracing::debug!(embedded = vectors.len(), total = texts.len(), "embedding progress");
    }

    Ok(vectors)
}

// ============ OpenAI Provider ============

/// Embedding provider using an OpenAI-compatible API.
///
/// The API key is passed in explicitly; resolving it from the environment is
/// the caller's job so a missing key surfaces as a configuration error.
#[derive(Debug)]
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    client: ApiClient,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let client = ApiClient::new(
            &config.base_url,
            api_key,
            config.timeout_secs,
            config.max_retries,
        )
        .map_err(QaError::Configuration)?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = self
            .client
            .post_json("/embeddings", &body)
            .await
            .map_err(QaError::EmbeddingService)?;

        let vectors = parse_openai_response(&json)?;
        if vectors.len() != texts.len() {
            return Err(QaError::EmbeddingService(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        if let Some(v) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(QaError::EmbeddingService(format!(
                "model returned {} dimensions, configured embedding.dims is {}",
                v.len(),
                self.dims
            )));
        }
        Ok(vectors)
    }
}

/// Parse the embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays and returns them ordered by
/// their `index` field.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let invalid = |what: &str| QaError::EmbeddingService(format!("invalid response: {}", what));

    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid("missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| invalid("missing embedding"))?;

        let vec = embedding
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| invalid("non-numeric embedding value"))?;

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use policy_qa::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors of
/// different lengths, and zero vectors.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
