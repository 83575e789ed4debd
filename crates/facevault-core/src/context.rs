//! Process-lifetime model handles.
//!
//! A [`ModelContext`] is created once at startup and shared by reference
//! (usually behind an `Arc`). The models can be installed exactly once;
//! after that the context is read-only. Calls made before initialisation
//! fail with `ModelNotInitialized`.

use crate::detector::FaceDetector;
use crate::error::PipelineError;
use crate::preprocess::{self, DETECTION_INPUT_SIZE, EMBEDDING_INPUT_SIZE};
use crate::recognizer::FaceRecognizer;
use crate::types::Embedding;
use image::DynamicImage;
use std::sync::OnceLock;

struct Models {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

#[derive(Default)]
pub struct ModelContext {
    models: OnceLock<Models>,
}

impl ModelContext {
    /// An empty context; every pipeline call fails until [`initialize`](Self::initialize).
    pub fn new() -> Self {
        Self::default()
    }

    /// Load both ONNX models into a ready context.
    pub fn load(
        detector_path: &str,
        recognizer_path: &str,
        intra_threads: usize,
    ) -> Result<Self, PipelineError> {
        let ctx = Self::new();
        ctx.initialize(
            FaceDetector::load(detector_path, intra_threads)?,
            FaceRecognizer::load(recognizer_path, intra_threads)?,
        )?;
        Ok(ctx)
    }

    /// Install the models. Fails if the context was already initialised.
    pub fn initialize(
        &self,
        detector: FaceDetector,
        recognizer: FaceRecognizer,
    ) -> Result<(), PipelineError> {
        self.models
            .set(Models {
                detector,
                recognizer,
            })
            .map_err(|_| PipelineError::AlreadyInitialized)?;
        tracing::info!("face models initialised");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.models.get().is_some()
    }

    pub fn detector(&self) -> Result<&FaceDetector, PipelineError> {
        self.models
            .get()
            .map(|m| &m.detector)
            .ok_or(PipelineError::ModelNotInitialized("SCRFD"))
    }

    pub fn recognizer(&self) -> Result<&FaceRecognizer, PipelineError> {
        self.models
            .get()
            .map(|m| &m.recognizer)
            .ok_or(PipelineError::ModelNotInitialized("ArcFace"))
    }

    /// Run the 640×640 presence test on a decoded image.
    pub fn contains_face(&self, image: &DynamicImage) -> Result<bool, PipelineError> {
        let detector = self.detector()?;
        let tensor = preprocess::normalize_image(image, DETECTION_INPUT_SIZE);
        detector.contains_face(&tensor)
    }

    /// Embed the whole image at 112×112.
    pub fn embed(&self, image: &DynamicImage) -> Result<Embedding, PipelineError> {
        let recognizer = self.recognizer()?;
        let tensor = preprocess::normalize_image(image, EMBEDDING_INPUT_SIZE);
        recognizer.extract(&tensor)
    }

    /// Decode, require a face, then embed. Nothing is returned unless both
    /// steps succeed.
    pub fn prepare(&self, bytes: &[u8]) -> Result<Embedding, PipelineError> {
        // Check readiness before spending time on decoding.
        self.detector()?;

        let image = preprocess::decode(bytes)?;
        if !self.contains_face(&image)? {
            return Err(PipelineError::NoFaceDetected);
        }
        self.embed(&image)
    }
}
