//! Per-user question-answering session.
//!
//! A [`Session`] owns everything one conversation needs: the chunk index
//! (if any documents have been ingested), the sliding-window memory, and
//! handles to the shared embedding and generation services.
//!
//! # Question turn
//!
//! ```text
//! query ──► condense (only if memory is non-empty) ──► standalone question
//!                                                          │
//!            parameters ◄── RetrievalParameters::for_query ┘
//!                │
//!                ▼
//!          retrieve (MMR) ──► answer prompt ──► generator ──► Answer
//!                                                         └──► memory.push
//! ```
//!
//! Memory is only updated after a turn fully succeeds.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::chunk::Chunker;
use crate::config::Config;
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{QaError, Result};
use crate::extract;
use crate::generation::{Generator, OpenAIGenerator};
use crate::index::sqlite::SqliteStorage;
use crate::index::{self, IndexStats, IndexStorage, VectorIndex};
use crate::memory::ConversationMemory;
use crate::models::{Answer, ChatMessage, Chunk, Document, SourceAttribution, Turn};
use crate::prompt;
use crate::retrieve::{self, RetrievalParameters};

/// Reply given when a question arrives before any document was indexed.
pub const NO_DOCUMENTS_REPLY: &str = "Please upload some documents first.";

/// Outcome for one document in an ingestion batch.
#[derive(Debug)]
pub struct FileOutcome {
    pub name: String,
    /// Number of chunks queued for indexing, or why the file was rejected.
    pub result: std::result::Result<usize, QaError>,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub files: Vec<FileOutcome>,
    /// Chunks actually written to the index.
    pub chunks_added: usize,
    /// Chunks dropped because identical content was already indexed.
    pub duplicates_skipped: usize,
    /// Set when the batch could not be embedded or stored. The index is
    /// unchanged in that case.
    pub batch_error: Option<QaError>,
    pub stats: IndexStats,
    /// Set when the index could not be counted after the batch. `stats` is
    /// zero then, but the batch outcome above still holds.
    pub stats_error: Option<QaError>,
}

impl IngestReport {
    pub fn failed_files(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| f.result.is_err())
    }

    pub fn is_success(&self) -> bool {
        self.batch_error.is_none() && self.files.iter().all(|f| f.result.is_ok())
    }
}

pub struct Session {
    config: Config,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    storage: Box<dyn IndexStorage>,
    index: Option<Box<dyn VectorIndex>>,
    memory: ConversationMemory,
}

impl Session {
    /// Open a session, reloading a previously persisted index if present.
    pub async fn open(
        config: Config,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        storage: Box<dyn IndexStorage>,
    ) -> Result<Self> {
        let index = storage.open().await?;

        if let Some(existing) = &index {
            if existing.dims() != embedder.dims() {
                let (stored, configured) = (existing.dims(), embedder.dims());
                existing.close().await;
                return Err(QaError::Configuration(format!(
                    "index was built with {}-dimensional embeddings but embedding.dims is {}; \
                     run `pqa reset` or restore the previous embedding settings",
                    stored, configured
                )));
            }
            if existing.model() != embedder.model_name() {
                tracing::warn!(
                    index_model = existing.model(),
                    embedder_model = embedder.model_name(),
                    "index was built with a different embedding model"
                );
            }
        }

        Ok(Self {
            chunker: Chunker::from_config(&config.chunking),
            memory: ConversationMemory::new(config.memory.window),
            config,
            embedder,
            generator,
            storage,
            index,
        })
    }

    /// Open a session backed by the OpenAI-compatible services and the
    /// on-disk index from `config`. Fails with a configuration error when
    /// the credential is missing.
    pub async fn from_config(config: Config) -> Result<Self> {
        let api_key = config.credentials.api_key()?;
        let embedder = OpenAIEmbedder::new(&config.embedding, api_key.clone())?;
        let generator = OpenAIGenerator::new(&config.generation, api_key)?;
        let storage = SqliteStorage::new(&config.index.dir);

        Self::open(
            config,
            Arc::new(embedder),
            Arc::new(generator),
            Box::new(storage),
        )
        .await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Load, chunk, and index a batch of documents.
    ///
    /// A document that fails to load is recorded in the report and does not
    /// affect the others. Everything that chunked successfully is then
    /// embedded and inserted as one atomic batch.
    pub async fn ingest(&mut self, documents: Vec<Document>) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut pending: Vec<Chunk> = Vec::new();
        // Content hashes per source, covering the index and this batch.
        let mut seen: HashMap<String, HashSet<String>> = HashMap::new();

        for doc in documents {
            let result = self
                .chunk_document(&doc, &mut seen, &mut report.duplicates_skipped)
                .await;
            match result {
                Ok(chunks) => {
                    tracing::info!(file = %doc.name, chunks = chunks.len(), "chunked document");
                    report.files.push(FileOutcome {
                        name: doc.name,
                        result: Ok(chunks.len()),
                    });
                    pending.extend(chunks);
                }
                Err(e) => {
                    tracing::warn!(file = %doc.name, error = %e, "skipping document");
                    report.files.push(FileOutcome {
                        name: doc.name,
                        result: Err(e),
                    });
                }
            }
        }

        if !pending.is_empty() {
            match self.add_chunks(pending).await {
                Ok(added) => report.chunks_added = added,
                Err(e) => {
                    tracing::warn!(error = %e, "indexing batch failed, index unchanged");
                    report.batch_error = Some(e);
                }
            }
        }

        match self.stats().await {
            Ok(stats) => report.stats = stats,
            Err(e) => {
                tracing::warn!(error = %e, "could not read index stats after ingestion");
                report.stats_error = Some(e);
            }
        }
        tracing::info!(
            added = report.chunks_added,
            total = report.stats.total_chunks,
            "ingestion finished"
        );
        Ok(report)
    }

    async fn chunk_document(
        &self,
        doc: &Document,
        seen: &mut HashMap<String, HashSet<String>>,
        duplicates: &mut usize,
    ) -> Result<Vec<Chunk>> {
        let pages = extract::load_document(doc)?;
        let mut chunks = self.chunker.split_pages(&doc.name, &pages);

        if self.config.ingest.skip_duplicates {
            if !seen.contains_key(&doc.name) {
                let known = match &self.index {
                    Some(index) => index.known_hashes(&doc.name).await?,
                    None => HashSet::new(),
                };
                seen.insert(doc.name.clone(), known);
            }
            let hashes = seen.entry(doc.name.clone()).or_default();
            let before = chunks.len();
            chunks.retain(|c| hashes.insert(c.hash.clone()));
            *duplicates += before - chunks.len();
        }

        Ok(chunks)
    }

    /// Embed and insert `chunks`, creating the index on first use.
    async fn add_chunks(&mut self, chunks: Vec<Chunk>) -> Result<usize> {
        let created = self.index.is_none();
        if created {
            let index = self
                .storage
                .create(self.embedder.model_name(), self.embedder.dims())
                .await?;
            self.index = Some(index);
        }

        let Some(index) = self.index.as_deref() else {
            return Err(QaError::Index("index unavailable".to_string()));
        };
        let batch_size = self.config.embedding.batch_size;
        let result = index::embed_and_insert(index, self.embedder.as_ref(), chunks, batch_size).await;

        if result.is_err() && created {
            // Roll back to "no index" rather than leaving an empty one behind.
            if let Some(index) = self.index.take() {
                index.close().await;
            }
            self.storage.destroy().await?;
        }
        result
    }

    /// Answer `query` using the indexed documents and the conversation so far.
    pub async fn ask(&mut self, query: &str) -> Result<Answer> {
        if self.stats().await?.total_chunks == 0 {
            return Ok(Answer {
                text: NO_DOCUMENTS_REPLY.to_string(),
                standalone_question: query.to_string(),
                sources: Vec::new(),
            });
        }

        let temperature = self.config.generation.temperature;
        let transcript = self.memory.transcript();

        let standalone = if self.memory.is_empty() {
            query.to_string()
        } else {
            let request = prompt::condense_question(&transcript, query, temperature);
            let rewritten = self.generator.generate(&request).await?;
            tracing::debug!(original = query, rewritten = %rewritten, "condensed follow-up");
            rewritten
        };

        let params = RetrievalParameters::for_query(&standalone)
            .with_floor(self.config.retrieval.similarity_floor);
        let context = retrieve::retrieve(
            self.index.as_deref(),
            self.embedder.as_ref(),
            &standalone,
            &params,
        )
        .await?;

        let request = prompt::answer_question(&context, &transcript, &standalone, temperature);
        let text = self.generator.generate(&request).await?;

        self.memory.push(query, text.as_str());

        Ok(Answer {
            text,
            standalone_question: standalone,
            sources: dedup_sources(&context),
        })
    }

    /// Conversation so far as role-tagged messages, oldest first.
    pub fn history(&self) -> Vec<ChatMessage> {
        self.memory.messages()
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.memory.turns()
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        match &self.index {
            Some(index) => index.stats().await,
            None => Ok(IndexStats::default()),
        }
    }

    /// Drop the index, its persisted files, and the conversation memory.
    pub async fn reset(&mut self) -> Result<()> {
        if let Some(index) = self.index.take() {
            index.close().await;
        }
        self.storage.destroy().await?;
        self.memory.clear();
        tracing::info!("session reset");
        Ok(())
    }

    /// Release storage handles.
    pub async fn close(self) {
        if let Some(index) = self.index {
            index.close().await;
        }
    }
}

/// Attributions for `chunks`, one per `(source, page)`, in first-seen order.
pub fn dedup_sources(chunks: &[Chunk]) -> Vec<SourceAttribution> {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .map(Chunk::attribution)
        .filter(|a| seen.insert(a.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, page: Option<u32>) -> Chunk {
        Chunk {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.into(),
            page,
            chunk_index: 0,
            text: String::new(),
            hash: String::new(),
        }
    }

    #[test]
    fn test_dedup_sources_keeps_first_seen_order() {
        let chunks = vec![
            chunk("b.pdf", Some(2)),
            chunk("a.txt", None),
            chunk("b.pdf", Some(2)),
            chunk("b.pdf", Some(3)),
        ];
        let sources = dedup_sources(&chunks);
        assert_eq!(
            crate::models::format_sources(&sources),
            "b.pdf (Page 2); a.txt; b.pdf (Page 3)"
        );
    }

    #[test]
    fn test_report_success_flags() {
        let mut report = IngestReport::default();
        assert!(report.is_success());
        report.files.push(FileOutcome {
            name: "x.txt".into(),
            result: Err(QaError::load("x.txt", "empty")),
        });
        assert!(!report.is_success());
        assert_eq!(report.failed_files().count(), 1);
    }
}
