//! facevaultd: HTTP service for storing, comparing and searching face
//! embeddings.

pub mod config;
pub mod server;
pub mod service;
pub mod store;

pub use config::Config;
pub use service::{FaceService, ServiceError};
pub use store::{FaceStore, StoreError};
