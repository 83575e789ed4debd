//! Nearest-neighbour ranking contract.
//!
//! Hits are ordered by ascending cosine distance (`1 − cosine`) and report
//! `cosine = 1 − distance`, both in f64. Any store that replaces the
//! in-process scan must produce the same order and values.

use crate::error::PipelineError;
use crate::types::Embedding;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A validated, positive result limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopK(usize);

impl TopK {
    pub fn new(k: usize) -> Result<Self, PipelineError> {
        if k == 0 {
            return Err(invalid_top_k());
        }
        Ok(Self(k))
    }

    /// Accept any positive finite number; fractions round up.
    pub fn from_f64(k: f64) -> Result<Self, PipelineError> {
        if !k.is_finite() || k <= 0.0 {
            return Err(invalid_top_k());
        }
        Self::new(k.ceil() as usize)
    }

    /// Parse a numeric string such as `"5"` or `" 2.5 "`.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        let k: f64 = raw.trim().parse().map_err(|_| invalid_top_k())?;
        Self::from_f64(k)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

fn invalid_top_k() -> PipelineError {
    PipelineError::Validation("Invalid top_k".into())
}

/// One nearest-neighbour result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub cosine: f64,
}

/// Rank `candidates` against `query` and keep the `k` closest.
///
/// Ties keep candidate order. NaN distances (zero vectors) sort last.
pub fn rank<I>(query: &Embedding, candidates: I, k: TopK) -> Result<Vec<SearchHit>, PipelineError>
where
    I: IntoIterator<Item = (String, Embedding)>,
{
    let mut scored = Vec::new();
    for (id, embedding) in candidates {
        let distance = query.cosine_distance(&embedding)?;
        scored.push((distance, id));
    }

    scored.sort_by(|(a, _), (b, _)| by_distance(*a, *b));
    scored.truncate(k.get());

    Ok(scored
        .into_iter()
        .map(|(distance, id)| SearchHit {
            id,
            cosine: 1.0 - distance,
        })
        .collect())
}

fn by_distance(a: f64, b: f64) -> Ordering {
    a.is_nan().cmp(&b.is_nan()).then_with(|| a.total_cmp(&b))
}
