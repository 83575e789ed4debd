//! ArcFace embedding extractor via ONNX Runtime.
//!
//! The whole image is resized to 112×112; no crop to the detected region is
//! made. The raw output vector is returned as-is (no L2 normalization), so
//! stored vectors and cosine scores match what the network emits.

use crate::backend::{InferenceBackend, InferenceError, OrtBackend};
use crate::error::PipelineError;
use crate::preprocess::{NormalizedTensor, EMBEDDING_INPUT_SIZE};
use crate::types::Embedding;
use ndarray::Axis;

/// Input name used by the insightface ArcFace exports.
pub const ARCFACE_DEFAULT_INPUT: &str = "data";

/// ArcFace-based face recognizer.
pub struct FaceRecognizer {
    backend: Box<dyn InferenceBackend>,
}

impl FaceRecognizer {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &str, intra_threads: usize) -> Result<Self, InferenceError> {
        let backend = OrtBackend::load(model_path, ARCFACE_DEFAULT_INPUT, intra_threads)?;
        tracing::info!(path = model_path, "ArcFace recognizer loaded");
        Ok(Self::with_backend(backend))
    }

    pub fn with_backend(backend: impl InferenceBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Extract an embedding from a 112×112 normalized tensor.
    ///
    /// The first output tensor is the embedding.
    pub fn extract(&self, tensor: &NormalizedTensor) -> Result<Embedding, PipelineError> {
        let expected = [3, EMBEDDING_INPUT_SIZE, EMBEDDING_INPUT_SIZE];
        if tensor.shape() != expected {
            return Err(InferenceError::InvalidInput(format!(
                "recognizer expects a {expected:?} tensor, got {:?}",
                tensor.shape()
            ))
            .into());
        }

        let input = tensor.view().insert_axis(Axis(0));
        let outputs = self.backend.run(input)?;

        let first = outputs.into_iter().next().ok_or_else(|| {
            InferenceError::InferenceFailed("embedding network produced no outputs".into())
        })?;
        if first.data.is_empty() {
            return Err(InferenceError::InferenceFailed(format!(
                "embedding output {} is empty",
                first.name
            ))
            .into());
        }

        tracing::debug!(output = %first.name, dim = first.data.len(), "embedding extracted");
        Ok(Embedding::new(first.data))
    }
}
