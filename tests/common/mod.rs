//! In-process fakes for the embedding and generation services.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use policy_qa::config::Config;
use policy_qa::embedding::Embedder;
use policy_qa::generation::Generator;
use policy_qa::index::memory::MemoryStorage;
use policy_qa::index::{Candidate, IndexEntry, IndexStats, IndexStorage, VectorIndex};
use policy_qa::models::Document;
use policy_qa::prompt::GenerationRequest;
use policy_qa::{QaError, Result, Session};

pub const DIMS: usize = 64;

/// Bag-of-words embedder: each lowercase word bumps one hashed bucket, so
/// texts sharing words end up close together.
pub struct HashingEmbedder {
    dims: usize,
    calls: Mutex<Vec<Vec<String>>>,
    fail: AtomicBool,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self::with_dims(DIMS)
    }

    pub fn with_dims(dims: usize) -> Self {
        Self {
            dims,
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_batch(&self) -> Option<Vec<String>> {
        self.calls.lock().unwrap().last().cloned()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut h: u64 = 0xcbf29ce484222325;
            for b in word.to_lowercase().bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % self.dims as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_name(&self) -> &str {
        "hashing-test"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.lock().unwrap().push(texts.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(QaError::EmbeddingService("429 Too Many Requests".into()));
        }
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}

/// Generator that records every request. Condense requests return the
/// configured rewrite (or echo the follow-up); answer requests return a
/// numbered canned answer.
pub struct RecordingGenerator {
    requests: Mutex<Vec<GenerationRequest>>,
    rewrite: Mutex<Option<String>>,
    fail: AtomicBool,
}

impl RecordingGenerator {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            rewrite: Mutex::new(None),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_rewrite(&self, rewrite: &str) {
        *self.rewrite.lock().unwrap() = Some(rewrite.to_string());
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

pub fn is_condense(request: &GenerationRequest) -> bool {
    request.messages[0].content.contains("Standalone Question:")
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn model_name(&self) -> &str {
        "recording-test"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };
        if self.fail.load(Ordering::SeqCst) {
            return Err(QaError::Generation("503 Service Unavailable".into()));
        }

        if is_condense(request) {
            if let Some(rewrite) = self.rewrite.lock().unwrap().clone() {
                return Ok(rewrite);
            }
            let body = &request.messages[0].content;
            let follow_up = body
                .split("Follow Up Input: ")
                .nth(1)
                .and_then(|rest| rest.split('\n').next())
                .unwrap_or_default();
            return Ok(follow_up.to_string());
        }
        Ok(format!("answer {}", n))
    }
}

/// Memory storage whose indexes fail `stats` while the switch is on.
pub struct StatsFailingStorage {
    inner: MemoryStorage,
    fail: Arc<AtomicBool>,
}

impl StatsFailingStorage {
    pub fn new(fail: Arc<AtomicBool>) -> Self {
        Self {
            inner: MemoryStorage::new(),
            fail,
        }
    }

    fn wrap(&self, inner: Box<dyn VectorIndex>) -> Box<dyn VectorIndex> {
        Box::new(StatsFailingIndex {
            inner,
            fail: self.fail.clone(),
        })
    }
}

struct StatsFailingIndex {
    inner: Box<dyn VectorIndex>,
    fail: Arc<AtomicBool>,
}

#[async_trait]
impl VectorIndex for StatsFailingIndex {
    fn model(&self) -> &str {
        self.inner.model()
    }

    fn dims(&self) -> usize {
        self.inner.dims()
    }

    async fn insert(&self, entries: &[IndexEntry]) -> Result<()> {
        self.inner.insert(entries).await
    }

    async fn stats(&self) -> Result<IndexStats> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(QaError::Index("database is locked".into()));
        }
        self.inner.stats().await
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Candidate>> {
        self.inner.nearest(query, limit).await
    }

    async fn known_hashes(&self, source: &str) -> Result<HashSet<String>> {
        self.inner.known_hashes(source).await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

#[async_trait]
impl IndexStorage for StatsFailingStorage {
    async fn open(&self) -> Result<Option<Box<dyn VectorIndex>>> {
        Ok(self.inner.open().await?.map(|index| self.wrap(index)))
    }

    async fn create(&self, model: &str, dims: usize) -> Result<Box<dyn VectorIndex>> {
        Ok(self.wrap(self.inner.create(model, dims).await?))
    }

    async fn destroy(&self) -> Result<()> {
        self.inner.destroy().await
    }
}

pub struct Harness {
    pub session: Session,
    pub embedder: Arc<HashingEmbedder>,
    pub generator: Arc<RecordingGenerator>,
}

pub async fn harness(config: Config, storage: Box<dyn IndexStorage>) -> Harness {
    harness_with(config, storage, Arc::new(HashingEmbedder::new())).await
}

pub async fn harness_with(
    config: Config,
    storage: Box<dyn IndexStorage>,
    embedder: Arc<HashingEmbedder>,
) -> Harness {
    let generator = Arc::new(RecordingGenerator::new());
    let session = Session::open(config, embedder.clone(), generator.clone(), storage)
        .await
        .unwrap();
    Harness {
        session,
        embedder,
        generator,
    }
}

pub fn auto_policy() -> Document {
    Document::from_upload(
        "auto.txt",
        b"Auto Policy\n\nThe collision deductible is $500 per accident.\n\n\
          Comprehensive coverage has a $250 deductible and covers theft, fire and hail.\n\n\
          Roadside assistance is included with towing up to 50 miles."
            .to_vec(),
    )
    .unwrap()
}

pub fn home_policy() -> Document {
    Document::from_upload(
        "home.md",
        b"# Homeowners Policy\n\nWater damage from a burst pipe is covered up to $10,000.\n\n\
          Flood damage is excluded unless a separate flood rider is purchased.\n\n\
          The dwelling deductible is $1,000."
            .to_vec(),
    )
    .unwrap()
}

/// Small chunks so every paragraph lands in its own chunk.
pub fn small_chunk_config() -> Config {
    let mut config = Config::default();
    config.chunking.chunk_size = 120;
    config.chunking.chunk_overlap = 20;
    config
}
