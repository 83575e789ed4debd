//! SQLite-backed persistence for face embeddings.
//!
//! Embeddings are stored as little-endian `f32` BLOBs next to their
//! dimension. Nearest-neighbour search scans every row and ranks in
//! process with [`facevault_core::rank`].

use chrono::{SecondsFormat, Utc};
use facevault_core::{rank, Embedding, PipelineError, SearchHit, TopK};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid value in database: {0}")]
    InvalidDbValue(String),
    #[error(transparent)]
    Ranking(#[from] PipelineError),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS face_embeddings (
    id           TEXT PRIMARY KEY,
    embedding    BLOB NOT NULL,
    dimension    INTEGER NOT NULL,
    image_base64 TEXT NOT NULL,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_face_embeddings_created_at
    ON face_embeddings(created_at);
";

/// Row summary returned by listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaceSummary {
    pub id: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct FaceStore {
    conn: Connection,
}

impl FaceStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    /// Insert a new record and return its generated id.
    pub async fn insert(
        &self,
        embedding: &Embedding,
        image_base64: String,
    ) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let blob = encode_embedding_blob(&embedding.values);
        let dimension = embedding.dim() as i64;

        let row_id = id.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO face_embeddings (id, embedding, dimension, image_base64, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![row_id, blob, dimension, image_base64, created_at],
                )?;
                Ok(())
            })
            .await?;

        tracing::debug!(%id, dimension, "stored face embedding");
        Ok(id)
    }

    /// Newest records first, at most `limit`.
    pub async fn list(&self, limit: usize) -> Result<Vec<FaceSummary>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, created_at FROM face_embeddings
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit], |row| {
                        Ok(FaceSummary {
                            id: row.get(0)?,
                            created_at: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    /// The stored base64 image for `id`, if the record exists.
    pub async fn image(&self, id: &str) -> Result<Option<String>, StoreError> {
        let id = id.to_string();
        let image = self
            .conn
            .call(move |conn| {
                let image = conn
                    .query_row(
                        "SELECT image_base64 FROM face_embeddings WHERE id = ?1",
                        params![id],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(image)
            })
            .await?;
        Ok(image)
    }

    /// Delete `id`. Returns `false` when no such record existed.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        let removed = self
            .conn
            .call(move |conn| {
                let n = conn.execute("DELETE FROM face_embeddings WHERE id = ?1", params![id])?;
                Ok(n)
            })
            .await?;
        Ok(removed > 0)
    }

    /// Rank every stored embedding against `query` and keep the `top_k` closest.
    pub async fn search(
        &self,
        query: &Embedding,
        top_k: TopK,
    ) -> Result<Vec<SearchHit>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, embedding, dimension FROM face_embeddings ORDER BY rowid",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Vec<u8>>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for (id, blob, dimension) in rows {
            let dimension = usize::try_from(dimension).map_err(|_| {
                StoreError::InvalidDbValue(format!("negative dimension for {id}"))
            })?;
            let values = decode_embedding_blob(&blob, dimension)?;
            candidates.push((id, Embedding::new(values)));
        }

        tracing::debug!(candidates = candidates.len(), k = top_k.get(), "ranking");
        Ok(rank(query, candidates, top_k)?)
    }
}

fn encode_embedding_blob(values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(values));
    for &value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

fn decode_embedding_blob(blob: &[u8], dimension: usize) -> Result<Vec<f32>, StoreError> {
    let expected = dimension
        .checked_mul(std::mem::size_of::<f32>())
        .ok_or_else(|| StoreError::InvalidDbValue("embedding dimension overflow".into()))?;
    if blob.len() != expected {
        return Err(StoreError::InvalidDbValue(format!(
            "embedding blob is {} bytes, expected {expected}",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}
