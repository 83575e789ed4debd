//! Inference engine boundary.
//!
//! Detector and recognizer talk to the network through [`InferenceBackend`]:
//! one NCHW f32 input under a named slot in, a list of named f32 output
//! tensors out. [`OrtBackend`] is the ONNX Runtime implementation.

use ndarray::ArrayView4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("model file not found: {0}; place the ONNX model in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("unexpected input tensor: {0}")]
    InvalidInput(String),
    #[error("session lock poisoned")]
    Poisoned,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A single named output tensor copied out of the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl OutputTensor {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            shape,
            data,
        }
    }
}

/// Something that can run a loaded network.
///
/// Implementations must be shareable across request threads; outputs are
/// returned in the engine's own order, which callers must not rely on.
pub trait InferenceBackend: Send + Sync {
    /// Name of the network's input slot.
    fn input_name(&self) -> &str;

    fn run(&self, input: ArrayView4<'_, f32>) -> Result<Vec<OutputTensor>, InferenceError>;
}

/// ONNX Runtime session.
///
/// `Session::run` needs exclusive access, so the session sits behind a mutex.
pub struct OrtBackend {
    session: Mutex<Session>,
    input_name: String,
}

impl OrtBackend {
    /// Load an ONNX model, falling back to `default_input` when the model
    /// does not report an input name.
    pub fn load(
        model_path: &str,
        default_input: &str,
        intra_threads: usize,
    ) -> Result<Self, InferenceError> {
        if !Path::new(model_path).exists() {
            return Err(InferenceError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| default_input.to_string());

        tracing::info!(
            path = model_path,
            input = %input_name,
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ONNX model"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn input_name(&self) -> &str {
        &self.input_name
    }

    fn run(&self, input: ArrayView4<'_, f32>) -> Result<Vec<OutputTensor>, InferenceError> {
        let mut session = self.session.lock().map_err(|_| InferenceError::Poisoned)?;
        let outputs = session.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(input)?
        ])?;

        let mut tensors = Vec::new();
        for (name, value) in outputs.iter() {
            let (shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::InferenceFailed(format!("output {name}: {e}")))?;
            let shape = shape
                .iter()
                .map(|&d| usize::try_from(d).unwrap_or(0))
                .collect();
            tensors.push(OutputTensor::new(name, shape, data.to_vec()));
        }

        Ok(tensors)
    }
}
