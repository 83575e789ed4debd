//! Pipeline error kinds.

use crate::backend::InferenceError;
use thiserror::Error;

/// Coarse classification of a failure, used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid caller-supplied parameters.
    Validation,
    /// The detector found no acceptable face candidate.
    NoFaceDetected,
    /// A pipeline call happened before the models were loaded.
    ModelNotInitialized,
    /// Image bytes could not be decoded.
    Decode,
    /// Lookup or delete of an absent identifier.
    NotFound,
    /// Anything else.
    Internal,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("no_face_detected")]
    NoFaceDetected,
    #[error("{0} model not initialised")]
    ModelNotInitialized(&'static str),
    #[error("models already initialised")]
    AlreadyInitialized,
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("embedding dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },
    #[error("inference: {0}")]
    Inference(#[from] InferenceError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NoFaceDetected => ErrorKind::NoFaceDetected,
            Self::ModelNotInitialized(_) => ErrorKind::ModelNotInitialized,
            Self::Decode(_) => ErrorKind::Decode,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyInitialized
            | Self::DimensionMismatch { .. }
            | Self::Inference(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }
}
