use crate::error::PipelineError;
use serde::{Deserialize, Serialize};

/// Face embedding vector (512-dimensional for the insightface ArcFace models).
///
/// All embeddings produced by one deployed model share a length; comparing
/// embeddings of different lengths is an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    fn check_dim(&self, other: &Embedding) -> Result<(), PipelineError> {
        if self.dim() != other.dim() {
            return Err(PipelineError::DimensionMismatch {
                left: self.dim(),
                right: other.dim(),
            });
        }
        Ok(())
    }

    /// Cosine similarity `Σab / (‖a‖·‖b‖)`, accumulated in f64.
    ///
    /// An all-zero vector yields NaN; it is not special-cased.
    pub fn similarity(&self, other: &Embedding) -> Result<f64, PipelineError> {
        self.check_dim(other)?;

        let mut dot = 0.0f64;
        let mut norm_a = 0.0f64;
        let mut norm_b = 0.0f64;

        for (&a, &b) in self.values.iter().zip(other.values.iter()) {
            let (a, b) = (f64::from(a), f64::from(b));
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        Ok(dot / (norm_a.sqrt() * norm_b.sqrt()))
    }

    /// Cosine distance `1 − similarity`, the nearest-neighbour ranking key.
    pub fn cosine_distance(&self, other: &Embedding) -> Result<f64, PipelineError> {
        Ok(1.0 - self.similarity(other)?)
    }

    /// Compute Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> Result<f64, PipelineError> {
        self.check_dim(other)?;
        Ok(self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(&a, &b)| (f64::from(a) - f64::from(b)).powi(2))
            .sum::<f64>()
            .sqrt())
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self::new(values)
    }
}

/// Result of comparing two embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub cosine: f64,
    pub euclidean: f64,
}

impl Comparison {
    pub fn between(a: &Embedding, b: &Embedding) -> Result<Self, PipelineError> {
        Ok(Self {
            cosine: a.similarity(b)?,
            euclidean: a.euclidean_distance(b)?,
        })
    }
}
