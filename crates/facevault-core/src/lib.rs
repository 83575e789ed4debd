//! facevault-core: Face presence detection and embedding engine.
//!
//! Uses SCRFD as a face-presence gate and ArcFace for embeddings, both
//! running via ONNX Runtime, plus the similarity and ranking math used to
//! compare stored embeddings.

pub mod backend;
pub mod context;
pub mod detector;
pub mod error;
pub mod preprocess;
pub mod ranking;
pub mod recognizer;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;

pub use backend::{InferenceBackend, InferenceError, OrtBackend, OutputTensor};
pub use context::ModelContext;
pub use detector::FaceDetector;
pub use error::{ErrorKind, PipelineError};
pub use ranking::{rank, SearchHit, TopK};
pub use recognizer::FaceRecognizer;
pub use types::{Comparison, Embedding};
