//! SQLite-backed [`VectorIndex`].
//!
//! Vectors are stored as little-endian `f32` BLOBs next to the chunk text
//! and metadata; search is a brute-force cosine scan in insertion order.
//! A `meta` table records the embedding model and dimensionality so a
//! resumed knowledge base is never searched with incompatible vectors.
//!
//! [`clear`](VectorIndex::clear) never leaves the caller without a usable
//! index. If the rows cannot be deleted (locked or damaged file) it falls
//! back, in order, to recreating the file, a fresh sibling file, and an
//! in-process database.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use docqa_core::embedding::{blob_to_vec, vec_to_blob};
use docqa_core::index::{check_batch, check_query, rank, ClearOutcome, VectorIndex};
use docqa_core::models::{Chunk, FileType, ScoredChunk};
use docqa_core::{RagError, Result};

use crate::db;

const CLEAR_ATTEMPTS: u32 = 3;
const CLEAR_BACKOFF_BASE: Duration = Duration::from_millis(50);

/// Where the index currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Memory,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::File(path) => write!(f, "{}", path.display()),
            Location::Memory => f.write_str(":memory:"),
        }
    }
}

pub struct SqliteIndex {
    pool: SqlitePool,
    location: Location,
    /// The configured path; fallbacks are placed next to it.
    home: Option<PathBuf>,
    dims: usize,
    model: String,
}

fn storage(e: impl fmt::Display) -> RagError {
    RagError::Storage(e.to_string())
}

impl SqliteIndex {
    /// Open the index at `path`.
    ///
    /// With `fresh` set, any database already at `path` is deleted first; if
    /// that is impossible a fresh sibling file is used instead. Without it,
    /// existing chunks are kept unless they were embedded with a different
    /// model or dimensionality, in which case they are discarded.
    pub async fn open(path: &Path, dims: usize, model: &str, fresh: bool) -> Result<Self> {
        let mut target = path.to_path_buf();
        if fresh {
            if let Err(e) = db::remove_database_files(path) {
                target = db::fresh_sibling_path(path);
                tracing::warn!(
                    path = %path.display(),
                    fallback = %target.display(),
                    error = %e,
                    "could not remove previous knowledge base, using a new file"
                );
            }
        }

        let pool = db::connect(&target).await.map_err(storage)?;
        let mut index = Self {
            pool,
            location: Location::File(target),
            home: Some(path.to_path_buf()),
            dims,
            model: model.to_string(),
        };
        index.prepare().await?;
        tracing::info!(location = %index.location, dims, model, "knowledge base opened");
        Ok(index)
    }

    /// An index that lives only as long as the process.
    pub async fn in_memory(dims: usize, model: &str) -> Result<Self> {
        let pool = db::connect_in_memory().await.map_err(storage)?;
        let mut index = Self {
            pool,
            location: Location::Memory,
            home: None,
            dims,
            model: model.to_string(),
        };
        index.prepare().await?;
        Ok(index)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Create tables and reconcile the stored model metadata.
    async fn prepare(&mut self) -> Result<()> {
        db::migrate(&self.pool).await.map_err(storage)?;

        let stored: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM meta")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        let lookup = |key: &str| {
            stored
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        let dims = self.dims.to_string();
        if let (Some(stored_model), Some(stored_dims)) = (lookup("model"), lookup("dims")) {
            if stored_model != self.model || stored_dims != dims {
                tracing::warn!(
                    stored_model = %stored_model,
                    stored_dims = %stored_dims,
                    model = %self.model,
                    dims = self.dims,
                    "embedding model changed, discarding stored chunks"
                );
                sqlx::query("DELETE FROM chunks")
                    .execute(&self.pool)
                    .await
                    .map_err(storage)?;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO meta (key, value) VALUES ('model', ?), ('dims', ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(&self.model)
        .bind(&dims)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    /// Replace the pool with a brand new empty database.
    async fn rebuild(&mut self, reason: String) -> Result<ClearOutcome> {
        self.pool.close().await;

        let mut candidates = Vec::new();
        if let Some(home) = &self.home {
            let current = match &self.location {
                Location::File(p) => p.clone(),
                Location::Memory => home.clone(),
            };
            candidates.push((current.clone(), true));
            candidates.push((db::fresh_sibling_path(&current), false));
        }

        for (path, remove_first) in candidates {
            if remove_first {
                if let Err(e) = db::remove_database_files(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "could not remove knowledge base file");
                    continue;
                }
            }
            match db::connect(&path).await {
                Ok(pool) => {
                    self.pool = pool;
                    self.location = Location::File(path);
                    match self.prepare().await {
                        Ok(()) => return Ok(self.rebuilt(reason)),
                        Err(e) => {
                            tracing::warn!(location = %self.location, error = %e, "rebuilt knowledge base unusable");
                            self.pool.close().await;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not create knowledge base file");
                }
            }
        }

        self.pool = db::connect_in_memory().await.map_err(storage)?;
        self.location = Location::Memory;
        self.prepare().await?;
        Ok(self.rebuilt(reason))
    }

    fn rebuilt(&self, reason: String) -> ClearOutcome {
        tracing::warn!(location = %self.location, reason = %reason, "knowledge base rebuilt");
        ClearOutcome::Rebuilt {
            location: self.location.to_string(),
            reason,
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn add(&mut self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_batch(self.dims, chunks, vectors)?;

        let mut tx = self.pool.begin().await.map_err(storage)?;
        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                "INSERT INTO chunks (source_name, file_type, sequence_index, text, embedding) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.source_name)
            .bind(chunk.file_type.as_str())
            .bind(chunk.sequence_index as i64)
            .bind(&chunk.text)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        check_query(self.dims, query)?;

        let rows = sqlx::query(
            "SELECT source_name, file_type, sequence_index, text, embedding FROM chunks ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let file_type: String = row.get("file_type");
            let sequence_index: i64 = row.get("sequence_index");
            let blob: Vec<u8> = row.get("embedding");
            let chunk = Chunk {
                text: row.get("text"),
                source_name: row.get("source_name"),
                file_type: file_type.parse::<FileType>().map_err(storage)?,
                sequence_index: sequence_index as usize,
            };
            entries.push((chunk, blob_to_vec(&blob)));
        }

        Ok(rank(
            query,
            entries.iter().map(|(c, v)| (c, v.as_slice())),
            k,
        ))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(count as usize)
    }

    async fn sources(&self) -> Result<BTreeSet<String>> {
        let names: Vec<String> = sqlx::query_scalar("SELECT DISTINCT source_name FROM chunks")
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        Ok(names.into_iter().collect())
    }

    async fn clear(&mut self) -> Result<ClearOutcome> {
        let mut last_err = String::new();
        for attempt in 0..CLEAR_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(CLEAR_BACKOFF_BASE * (1 << (attempt - 1))).await;
            }
            match sqlx::query("DELETE FROM chunks").execute(&self.pool).await {
                Ok(_) => return Ok(ClearOutcome::Cleared),
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "clearing knowledge base failed");
                    last_err = e.to_string();
                }
            }
        }
        self.rebuild(last_err).await
    }
}
