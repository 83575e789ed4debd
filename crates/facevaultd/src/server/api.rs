use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use facevault_core::{Comparison, SearchHit};

use super::error::Result;
use super::extract::JsonBody;
use super::types::*;
use crate::service::{FaceService, StagedImage};
use crate::store::FaceSummary;

/// Embed an image from disk and store it.
pub async fn store_embedding_handler(
    State(service): State<Arc<FaceService>>,
    JsonBody(req): JsonBody<StoreRequest>,
) -> Result<Json<StoreResponse>> {
    let id = service.store_embedding(req.image_path.as_deref()).await?;
    Ok(Json(StoreResponse { id }))
}

/// Cosine similarity and Euclidean distance between two images.
pub async fn compare_handler(
    State(service): State<Arc<FaceService>>,
    JsonBody(req): JsonBody<CompareRequest>,
) -> Result<Json<Comparison>> {
    let comparison = service
        .compare(req.image_path_a.as_deref(), req.image_path_b.as_deref())
        .await?;
    Ok(Json(comparison))
}

/// Nearest stored faces.
pub async fn search_handler(
    State(service): State<Arc<FaceService>>,
    JsonBody(req): JsonBody<SearchRequest>,
) -> Result<Json<Vec<SearchHit>>> {
    let hits = service
        .search(req.image_path.as_deref(), req.top_k.as_ref())
        .await?;
    Ok(Json(hits))
}

pub async fn list_handler(
    State(service): State<Arc<FaceService>>,
    query: std::result::Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<FaceSummary>>> {
    // An unreadable query string behaves like an absent limit.
    let limit = query.ok().and_then(|Query(q)| q.limit);
    Ok(Json(service.list(limit.as_deref()).await?))
}

pub async fn image_handler(
    State(service): State<Arc<FaceService>>,
    Path(id): Path<String>,
) -> Result<Json<StagedImage>> {
    Ok(Json(service.image(&id).await?))
}

pub async fn delete_handler(
    State(service): State<Arc<FaceService>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let deleted_id = service.delete(&id).await?;
    Ok(Json(DeleteResponse { deleted_id }))
}
