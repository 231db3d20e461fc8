//! SQLite-backed [`VectorIndex`].
//!
//! One database file, `index.sqlite`, inside the configured index
//! directory. Chunks and their embeddings share a row; a small `meta` table
//! records the embedding model and dimensionality the index was built with.
//! Each [`insert`](VectorIndex::insert) runs in a single transaction, so a
//! batch is either fully persisted or not at all.
//!
//! Similarity search loads every vector and scores it in Rust. Policy
//! corpora are small enough that a brute-force scan beats maintaining an
//! ANN structure.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{QaError, Result};
use crate::models::Chunk;

use super::{rank_candidates, Candidate, IndexEntry, IndexStats, IndexStorage, VectorIndex};

pub const INDEX_FILE: &str = "index.sqlite";

async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    if create {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // No uniqueness on (source, chunk_index): re-ingesting a file appends.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            page INTEGER,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source, hash)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn read_meta(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM meta WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(value)
}

/// Persistent index over a single SQLite database.
pub struct SqliteIndex {
    pool: SqlitePool,
    model: String,
    dims: usize,
}

impl SqliteIndex {
    async fn load(pool: SqlitePool) -> Result<Self> {
        let model = read_meta(&pool, "model").await?;
        let dims = read_meta(&pool, "dims").await?;

        let (model, dims) = match (model, dims) {
            (Some(model), Some(dims)) => (model, dims),
            _ => {
                pool.close().await;
                return Err(QaError::Index(
                    "index database has no model metadata; run `pqa reset`".to_string(),
                ));
            }
        };
        let dims = dims
            .parse::<usize>()
            .map_err(|_| QaError::Index(format!("invalid dims in index metadata: {}", dims)))?;

        Ok(Self { pool, model, dims })
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
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

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        for entry in entries {
            let chunk = &entry.chunk;
            sqlx::query(
                r#"
                INSERT INTO chunks (id, source, page, chunk_index, text, hash, embedding, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(chunk.page.map(i64::from))
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vec_to_blob(&entry.vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats> {
        let row = sqlx::query("SELECT COUNT(*) AS total, COUNT(DISTINCT source) AS sources FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let total: i64 = row.get("total");
        let sources: i64 = row.get("sources");

        Ok(IndexStats {
            total_chunks: total as usize,
            total_sources: sources as usize,
        })
    }

    async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Candidate>> {
        let rows = sqlx::query(
            r#"
            SELECT id, source, page, chunk_index, text, hash, embedding
            FROM chunks
            ORDER BY rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let candidates = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let score = cosine_similarity(query, &vector);
                let page: Option<i64> = row.get("page");
                Candidate {
                    chunk: Chunk {
                        id: row.get("id"),
                        source: row.get("source"),
                        page: page.map(|p| p as u32),
                        chunk_index: row.get("chunk_index"),
                        text: row.get("text"),
                        hash: row.get("hash"),
                    },
                    vector,
                    score,
                }
            })
            .collect();

        Ok(rank_candidates(candidates, limit))
    }

    async fn known_hashes(&self, source: &str) -> Result<HashSet<String>> {
        let hashes: Vec<String> = sqlx::query_scalar("SELECT hash FROM chunks WHERE source = ?")
            .bind(source)
            .fetch_all(&self.pool)
            .await?;
        Ok(hashes.into_iter().collect())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Storage rooted at an index directory.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    path: PathBuf,
}

impl SqliteStorage {
    /// Storage for `<dir>/index.sqlite`.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(INDEX_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sidecars(&self) -> [PathBuf; 3] {
        let base = self.path.display().to_string();
        [
            self.path.clone(),
            PathBuf::from(format!("{}-wal", base)),
            PathBuf::from(format!("{}-shm", base)),
        ]
    }
}

#[async_trait]
impl IndexStorage for SqliteStorage {
    async fn open(&self) -> Result<Option<Box<dyn VectorIndex>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let pool = connect(&self.path, false).await?;
        run_migrations(&pool).await?;
        let index = SqliteIndex::load(pool).await?;

        tracing::debug!(
            path = %self.path.display(),
            model = %index.model,
            dims = index.dims,
            "reopened index"
        );
        Ok(Some(Box::new(index)))
    }

    async fn create(&self, model: &str, dims: usize) -> Result<Box<dyn VectorIndex>> {
        let pool = connect(&self.path, true).await?;
        run_migrations(&pool).await?;

        for (key, value) in [("model", model.to_string()), ("dims", dims.to_string())] {
            sqlx::query("INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&pool)
                .await?;
        }

        tracing::info!(path = %self.path.display(), model, dims, "created index");
        Ok(Box::new(SqliteIndex {
            pool,
            model: model.to_string(),
            dims,
        }))
    }

    async fn destroy(&self) -> Result<()> {
        for file in self.sidecars() {
            match std::fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::info!(path = %self.path.display(), "removed index");
        Ok(())
    }
}
