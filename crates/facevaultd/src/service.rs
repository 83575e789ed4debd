//! Request orchestration between the model context and the store.
//!
//! Every operation that touches an image reads it from disk, keeps the raw
//! bytes as base64, and runs the detect-then-embed pipeline on a blocking
//! thread. Parameters are validated before any file access or inference.

use crate::store::{FaceStore, FaceSummary, StoreError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use facevault_core::{Comparison, Embedding, ErrorKind, ModelContext, PipelineError, SearchHit, TopK};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Rows returned by `list` when the caller gives no usable limit.
pub const DEFAULT_LIST_LIMIT: usize = 10;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored image is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("pipeline task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Pipeline(e) | Self::Store(StoreError::Ranking(e)) => e.kind(),
            _ => ErrorKind::Internal,
        }
    }
}

fn missing(what: &str) -> ServiceError {
    PipelineError::Validation(format!("Missing {what}")).into()
}

/// An image read from disk together with its embedding.
pub struct PreparedImage {
    pub image_base64: String,
    pub embedding: Embedding,
}

/// A stored image staged to the output directory.
#[derive(Debug, Clone, Serialize)]
pub struct StagedImage {
    pub image_base64: String,
    pub saved_to: String,
}

pub struct FaceService {
    models: Arc<ModelContext>,
    store: FaceStore,
    output_dir: PathBuf,
}

impl FaceService {
    pub fn new(models: Arc<ModelContext>, store: FaceStore, output_dir: PathBuf) -> Self {
        Self {
            models,
            store,
            output_dir,
        }
    }

    /// Read the file at `path`, then detect and embed it.
    pub async fn prepare(&self, path: &str) -> Result<PreparedImage, ServiceError> {
        let bytes = tokio::fs::read(path).await?;
        let image_base64 = STANDARD.encode(&bytes);

        let models = Arc::clone(&self.models);
        let embedding = tokio::task::spawn_blocking(move || models.prepare(&bytes)).await??;

        tracing::debug!(path, dim = embedding.dim(), "prepared image");
        Ok(PreparedImage {
            image_base64,
            embedding,
        })
    }

    /// Embed the image at `image_path` and persist it. Returns the new id.
    pub async fn store_embedding(&self, image_path: Option<&str>) -> Result<String, ServiceError> {
        let path = non_empty(image_path).ok_or_else(|| missing("image_path"))?;
        let prepared = self.prepare(path).await?;
        let id = self
            .store
            .insert(&prepared.embedding, prepared.image_base64)
            .await?;
        tracing::info!(%id, "stored face");
        Ok(id)
    }

    /// Compare two images. Both are prepared concurrently.
    pub async fn compare(
        &self,
        image_a: Option<&str>,
        image_b: Option<&str>,
    ) -> Result<Comparison, ServiceError> {
        let (Some(a), Some(b)) = (non_empty(image_a), non_empty(image_b)) else {
            return Err(missing("images"));
        };
        let (a, b) = tokio::try_join!(self.prepare(a), self.prepare(b))?;
        Ok(Comparison::between(&a.embedding, &b.embedding)?)
    }

    /// Nearest stored faces to the image at `image_path`.
    ///
    /// `top_k` may be a JSON number or a numeric string.
    pub async fn search(
        &self,
        image_path: Option<&str>,
        top_k: Option<&Value>,
    ) -> Result<Vec<SearchHit>, ServiceError> {
        let (Some(path), Some(top_k)) = (non_empty(image_path), top_k.filter(|v| !v.is_null()))
        else {
            return Err(missing("params"));
        };
        let top_k = parse_top_k(top_k)?;

        let prepared = self.prepare(path).await?;
        let hits = self.store.search(&prepared.embedding, top_k).await?;
        tracing::debug!(hits = hits.len(), "search complete");
        Ok(hits)
    }

    /// Most recent records. `limit` is read like a leading integer and
    /// falls back to [`DEFAULT_LIST_LIMIT`] when absent or negative.
    pub async fn list(&self, limit: Option<&str>) -> Result<Vec<FaceSummary>, ServiceError> {
        Ok(self.store.list(parse_limit(limit)).await?)
    }

    /// Stored image for `id`, also written to the output directory.
    pub async fn image(&self, id: &str) -> Result<StagedImage, ServiceError> {
        let image_base64 = self
            .store
            .image(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))?;

        let bytes = STANDARD.decode(&image_base64)?;
        let saved_to = stage_image(&self.output_dir, id, &bytes).await?;
        tracing::info!(%id, saved_to = %saved_to.display(), "staged image");

        Ok(StagedImage {
            image_base64,
            saved_to: saved_to.to_string_lossy().into_owned(),
        })
    }

    /// Remove the record for `id`.
    pub async fn delete(&self, id: &str) -> Result<String, ServiceError> {
        if !self.store.delete(id).await? {
            return Err(PipelineError::NotFound(id.to_string()).into());
        }
        tracing::info!(%id, "deleted face");
        Ok(id.to_string())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn parse_top_k(value: &Value) -> Result<TopK, PipelineError> {
    match value {
        Value::Number(n) => TopK::from_f64(n.as_f64().unwrap_or(f64::NAN)),
        Value::String(s) => TopK::parse(s),
        _ => Err(PipelineError::Validation("Invalid top_k".into())),
    }
}

/// Leading integer of `raw` (`"5.7"` and `"5abc"` give 5); anything without
/// one, or negative, gives [`DEFAULT_LIST_LIMIT`].
fn parse_limit(raw: Option<&str>) -> usize {
    raw.and_then(leading_integer)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(DEFAULT_LIST_LIMIT)
}

fn leading_integer(raw: &str) -> Option<i64> {
    let s = raw.trim_start();
    let sign_len = usize::from(s.starts_with(['+', '-']));
    let digits = s[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    let end = sign_len + digits;
    // Overlong digit runs saturate instead of failing.
    Some(s[..end].parse().unwrap_or(if s.starts_with('-') { i64::MIN } else { i64::MAX }))
}

/// Write `bytes` to `<dir>/<id>.<ext>` and return the absolute path.
async fn stage_image(dir: &Path, id: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    let ext = image::guess_format(bytes)
        .ok()
        .and_then(|f| f.extensions_str().first().copied())
        .unwrap_or("bin");
    // Ids come from the store, but keep the file name inside `dir` regardless.
    let name: String = id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(format!("{name}.{ext}"));
    tokio::fs::write(&path, bytes).await?;
    tokio::fs::canonicalize(&path).await
}
