mod api;
mod error;
mod extract;
mod types;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use self::error::AppError;
use crate::service::FaceService;

/// Build the HTTP router. Bodies over `body_limit` bytes get a 413 with an
/// `{"error"}` body from the JSON extractor.
pub fn create_app(service: Arc<FaceService>, body_limit: usize) -> Router {
    Router::new()
        .route("/store_embedding", post(api::store_embedding_handler))
        .route("/compare", post(api::compare_handler))
        .route("/search", post(api::search_handler))
        .route("/list", get(api::list_handler))
        .route("/image/{id}", get(api::image_handler))
        .route("/item/{id}", delete(api::delete_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
