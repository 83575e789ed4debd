//! SCRFD face presence test via ONNX Runtime.
//!
//! The detector here is a predicate: it answers "is there at least one
//! face-like region" and throws the geometry away once it has decided.
//! No boxes, NMS or multi-face results leave this module.
//!
//! SCRFD emits, per stride in {8, 16, 32}, a score tensor `[anchors, 1]` of
//! logits and a bbox tensor `[anchors, 4]` of (left, top, right, bottom)
//! distances from the anchor centre in stride units, with 2 anchors per
//! grid cell. Output order and names are not stable across exports, so
//! tensors are matched to strides by name when possible and by shape
//! otherwise.

use crate::backend::{InferenceBackend, InferenceError, OrtBackend, OutputTensor};
use crate::error::PipelineError;
use crate::preprocess::{NormalizedTensor, DETECTION_INPUT_SIZE};
use ndarray::Axis;
use std::collections::BTreeMap;

// --- Named constants (no magic numbers) ---
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_MIN_FACE_SIZE: f32 = 20.0;
const SCRFD_MAX_FACE_SIZE: f32 = DETECTION_INPUT_SIZE as f32;
const SCRFD_MIN_ASPECT: f32 = 0.25;
const SCRFD_MAX_ASPECT: f32 = 4.0;
const SCRFD_SCORE_CHANNELS: usize = 1;
const SCRFD_BBOX_CHANNELS: usize = 4;
/// Input name used by the insightface SCRFD exports.
pub const SCRFD_DEFAULT_INPUT: &str = "input.1";

/// Score and bbox data for one stride level.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct StrideOutputs<'a> {
    pub scores: Option<&'a [f32]>,
    pub bboxes: Option<&'a [f32]>,
}

/// Stride → outputs lookup table, iterated in ascending stride order.
pub type StrideTable<'a> = BTreeMap<usize, StrideOutputs<'a>>;

/// Anchor count a stride level produces for the 640×640 input.
pub fn expected_anchor_count(stride: usize) -> usize {
    let feat = DETECTION_INPUT_SIZE / stride;
    feat * feat * SCRFD_ANCHORS_PER_CELL
}

/// Build the stride table for a set of detector outputs.
///
/// Uses `score_{stride}` / `bbox_{stride}` names when every stride is
/// labelled that way; otherwise matches by shape.
pub fn group_outputs(outputs: &[OutputTensor]) -> StrideTable<'_> {
    match group_by_name(outputs) {
        Some(table) => table,
        None => group_by_shape(outputs),
    }
}

fn find_named<'a>(outputs: &'a [OutputTensor], prefix: &str, stride: usize) -> Option<&'a [f32]> {
    let target = format!("{prefix}_{stride}");
    outputs
        .iter()
        .find(|o| o.name == target)
        .map(|o| o.data.as_slice())
}

fn group_by_name(outputs: &[OutputTensor]) -> Option<StrideTable<'_>> {
    let mut table = StrideTable::new();
    for stride in SCRFD_STRIDES {
        let scores = find_named(outputs, "score", stride)?;
        let bboxes = find_named(outputs, "bbox", stride)?;
        table.insert(
            stride,
            StrideOutputs {
                scores: Some(scores),
                bboxes: Some(bboxes),
            },
        );
    }
    Some(table)
}

/// Match rank-2 `[anchors, channels]` tensors to the first stride whose
/// anchor count fits. One channel is a score tensor, four a bbox tensor;
/// anything else is ignored. A later tensor of the same role replaces an
/// earlier one.
fn group_by_shape(outputs: &[OutputTensor]) -> StrideTable<'_> {
    let mut table = StrideTable::new();

    for tensor in outputs {
        let &[anchors, channels] = tensor.shape.as_slice() else {
            continue;
        };
        let Some(stride) = SCRFD_STRIDES
            .iter()
            .copied()
            .find(|&s| expected_anchor_count(s) == anchors)
        else {
            continue;
        };

        let data = tensor.data.as_slice();
        match channels {
            SCRFD_SCORE_CHANNELS => table.entry(stride).or_default().scores = Some(data),
            SCRFD_BBOX_CHANNELS => table.entry(stride).or_default().bboxes = Some(data),
            _ => {}
        }
    }

    table
}

/// Logistic function.
#[inline]
pub fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}

/// A single anchor that passed the score and geometry checks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionCandidate {
    pub stride: usize,
    pub probability: f32,
    /// Pixel distances from the anchor centre.
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl DetectionCandidate {
    pub fn width(&self) -> f32 {
        self.left + self.right
    }

    pub fn height(&self) -> f32 {
        self.top + self.bottom
    }

    pub fn aspect(&self) -> f32 {
        self.width() / self.height()
    }
}

/// Decode one anchor. `bbox` holds its four raw distance channels.
///
/// Returns `None` for a probability under 0.5, any non-positive distance,
/// or a box outside 20..=640 px per side or 0.25..=4.0 aspect.
pub fn decode_anchor(stride: usize, logit: f32, bbox: &[f32]) -> Option<DetectionCandidate> {
    let probability = sigmoid(logit);
    if probability < SCRFD_CONFIDENCE_THRESHOLD {
        return None;
    }

    let &[l, t, r, b] = bbox else {
        return None;
    };
    let scale = stride as f32;
    let candidate = DetectionCandidate {
        stride,
        probability,
        left: l * scale,
        top: t * scale,
        right: r * scale,
        bottom: b * scale,
    };

    if candidate.left <= 0.0
        || candidate.top <= 0.0
        || candidate.right <= 0.0
        || candidate.bottom <= 0.0
    {
        return None;
    }

    let (width, height) = (candidate.width(), candidate.height());
    let aspect = candidate.aspect();
    let accepted = width >= SCRFD_MIN_FACE_SIZE
        && height >= SCRFD_MIN_FACE_SIZE
        && width <= SCRFD_MAX_FACE_SIZE
        && height <= SCRFD_MAX_FACE_SIZE
        && (SCRFD_MIN_ASPECT..=SCRFD_MAX_ASPECT).contains(&aspect);

    accepted.then_some(candidate)
}

/// First accepted anchor in scan order: strides ascending, anchors by index.
/// Strides missing either tensor are skipped.
pub fn first_candidate(table: &StrideTable<'_>) -> Option<DetectionCandidate> {
    for (&stride, outputs) in table {
        let (Some(scores), Some(bboxes)) = (outputs.scores, outputs.bboxes) else {
            continue;
        };

        for (idx, &logit) in scores.iter().enumerate() {
            let off = idx * SCRFD_BBOX_CHANNELS;
            let Some(bbox) = bboxes.get(off..off + SCRFD_BBOX_CHANNELS) else {
                break;
            };
            if let Some(candidate) = decode_anchor(stride, logit, bbox) {
                return Some(candidate);
            }
        }
    }
    None
}

/// True when any anchor in the table is accepted.
pub fn face_present(table: &StrideTable<'_>) -> bool {
    match first_candidate(table) {
        Some(candidate) => {
            tracing::trace!(?candidate, "face candidate accepted");
            true
        }
        None => false,
    }
}

/// SCRFD-based face presence detector.
pub struct FaceDetector {
    backend: Box<dyn InferenceBackend>,
}

impl FaceDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str, intra_threads: usize) -> Result<Self, InferenceError> {
        let backend = OrtBackend::load(model_path, SCRFD_DEFAULT_INPUT, intra_threads)?;
        tracing::info!(path = model_path, "SCRFD detector loaded");
        Ok(Self::with_backend(backend))
    }

    pub fn with_backend(backend: impl InferenceBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Run the detector on a 640×640 tensor and report face presence.
    pub fn contains_face(&self, tensor: &NormalizedTensor) -> Result<bool, PipelineError> {
        let expected = [3, DETECTION_INPUT_SIZE, DETECTION_INPUT_SIZE];
        if tensor.shape() != expected {
            return Err(InferenceError::InvalidInput(format!(
                "detector expects a {expected:?} tensor, got {:?}",
                tensor.shape()
            ))
            .into());
        }

        let input = tensor.view().insert_axis(Axis(0));
        let outputs = self.backend.run(input)?;
        let table = group_outputs(&outputs);

        tracing::debug!(
            outputs = outputs.len(),
            strides = ?table.keys().collect::<Vec<_>>(),
            "SCRFD outputs grouped"
        );

        Ok(face_present(&table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn tensor(name: &str, anchors: usize, channels: usize, data: Vec<f32>) -> OutputTensor {
        OutputTensor::new(name, vec![anchors, channels], data)
    }

    /// Outputs for one stride: every anchor gets `logit`; anchor `hit` gets `bbox`.
    fn stride_outputs(stride: usize, logit: f32, hit: usize, bbox: [f32; 4]) -> Vec<OutputTensor> {
        let n = expected_anchor_count(stride);
        let mut boxes = vec![0.0; n * 4];
        boxes[hit * 4..hit * 4 + 4].copy_from_slice(&bbox);
        vec![
            tensor(&format!("s{stride}"), n, 1, vec![logit; n]),
            tensor(&format!("b{stride}"), n, 4, boxes),
        ]
    }

    #[test]
    fn test_expected_anchor_counts() {
        assert_eq!(expected_anchor_count(8), 12800);
        assert_eq!(expected_anchor_count(16), 3200);
        assert_eq!(expected_anchor_count(32), 800);
    }

    #[test]
    fn test_sigmoid_boundary() {
        assert_eq!(sigmoid(0.0), 0.5);
        // logit 0 → exactly 0.5 → accepted
        assert!(decode_anchor(8, 0.0, &[4.0, 4.0, 4.0, 4.0]).is_some());
        // logit for p = 0.4999 → rejected
        let logit = (0.4999f32 / (1.0 - 0.4999)).ln();
        assert!(sigmoid(logit) < 0.5);
        assert!(decode_anchor(8, logit, &[4.0, 4.0, 4.0, 4.0]).is_none());
    }

    #[test]
    fn test_decode_anchor_scales_by_stride() {
        let c = decode_anchor(16, 3.0, &[1.0, 2.0, 1.5, 2.5]).unwrap();
        assert_eq!((c.left, c.top, c.right, c.bottom), (16.0, 32.0, 24.0, 40.0));
        assert_eq!(c.width(), 40.0);
        assert_eq!(c.height(), 72.0);
        assert_eq!(c.stride, 16);
    }

    #[test]
    fn test_decode_anchor_rejects_non_positive_distance() {
        assert!(decode_anchor(8, 5.0, &[0.0, 4.0, 4.0, 4.0]).is_none());
        assert!(decode_anchor(8, 5.0, &[4.0, -1.0, 4.0, 4.0]).is_none());
    }

    #[test]
    fn test_decode_anchor_size_bounds() {
        // 8 * (1 + 1) = 16 px wide: too small
        assert!(decode_anchor(8, 5.0, &[1.0, 2.0, 1.0, 2.0]).is_none());
        // exactly 20 px is allowed
        assert!(decode_anchor(2, 5.0, &[5.0, 5.0, 5.0, 5.0]).is_some());
        // 32 * 11 = 352 + 352 = 704 px: larger than the input
        assert!(decode_anchor(32, 5.0, &[11.0, 5.0, 11.0, 5.0]).is_none());
        // exactly 640 allowed
        assert!(decode_anchor(32, 5.0, &[10.0, 10.0, 10.0, 10.0]).is_some());
    }

    #[test]
    fn test_decode_anchor_aspect_bounds() {
        // width 80, height 20 → aspect 4.0: allowed
        assert!(decode_anchor(1, 5.0, &[40.0, 10.0, 40.0, 10.0]).is_some());
        // width 84, height 20 → 4.2: rejected
        assert!(decode_anchor(1, 5.0, &[42.0, 10.0, 42.0, 10.0]).is_none());
        // width 20, height 84 → 0.238: rejected
        assert!(decode_anchor(1, 5.0, &[10.0, 42.0, 10.0, 42.0]).is_none());
    }

    #[test]
    fn test_decode_anchor_wrong_channel_count() {
        assert!(decode_anchor(8, 5.0, &[4.0, 4.0, 4.0]).is_none());
    }

    #[test]
    fn test_contains_face_rejects_wrong_tensor_size() {
        let detector = FaceDetector::with_backend(crate::testing::SyntheticScrfd);
        let err = detector
            .contains_face(&ndarray::Array3::<f32>::zeros((3, 112, 112)))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Inference(InferenceError::InvalidInput(_))
        ));
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }

    #[test]
    fn test_group_by_shape_ignores_order() {
        let mut outputs = Vec::new();
        outputs.extend(stride_outputs(32, -5.0, 0, [0.0; 4]));
        outputs.extend(stride_outputs(8, -5.0, 0, [0.0; 4]));
        // Landmark tensor (10 channels) is ignored.
        outputs.push(tensor("kps8", 12800, 10, vec![0.0; 128000]));
        outputs.extend(stride_outputs(16, -5.0, 0, [0.0; 4]));

        let table = group_outputs(&outputs);
        assert_eq!(table.keys().copied().collect::<Vec<_>>(), vec![8, 16, 32]);
        for outputs in table.values() {
            assert!(outputs.scores.is_some());
            assert!(outputs.bboxes.is_some());
        }
        assert_eq!(table[&8].scores.unwrap().len(), 12800);
        assert_eq!(table[&32].bboxes.unwrap().len(), 3200);
    }

    #[test]
    fn test_group_by_shape_skips_unmatched() {
        let outputs = vec![
            // anchor count matches no stride
            tensor("odd", 1000, 1, vec![5.0; 1000]),
            // rank 3
            OutputTensor::new("r3", vec![1, 800, 1], vec![5.0; 800]),
            // 2 channels
            tensor("two", 800, 2, vec![5.0; 1600]),
        ];
        assert!(group_outputs(&outputs).is_empty());
    }

    #[test]
    fn test_group_by_name() {
        let mut outputs = Vec::new();
        for stride in SCRFD_STRIDES {
            let n = expected_anchor_count(stride);
            // Shapes are batch-prefixed so shape matching alone would miss them.
            outputs.push(OutputTensor::new(format!("bbox_{stride}"), vec![1, n, 4], vec![0.0; n * 4]));
            outputs.push(OutputTensor::new(format!("score_{stride}"), vec![1, n, 1], vec![0.0; n]));
        }
        let table = group_outputs(&outputs);
        assert_eq!(table.len(), 3);
        assert_eq!(table[&16].scores.unwrap().len(), 3200);
        assert_eq!(table[&16].bboxes.unwrap().len(), 12800);
    }

    #[test]
    fn test_partial_names_fall_back_to_shape() {
        let n = expected_anchor_count(8);
        let outputs = vec![
            tensor("score_8", n, 1, vec![0.0; n]),
            tensor("bbox_8", n, 4, vec![0.0; n * 4]),
        ];
        let table = group_outputs(&outputs);
        assert_eq!(table.keys().copied().collect::<Vec<_>>(), vec![8]);
    }

    #[test]
    fn test_face_present_single_hit() {
        let outputs = stride_outputs(16, 2.0, 100, [2.0, 2.5, 2.0, 2.5]);
        let mut table = group_outputs(&outputs);
        // all other anchors have zero-distance boxes and are rejected
        assert!(face_present(&table));

        let candidate = first_candidate(&table).unwrap();
        assert_eq!(candidate.stride, 16);
        assert_eq!(candidate.width(), 64.0);

        table.get_mut(&16).unwrap().bboxes = None;
        assert!(!face_present(&table));
    }

    #[test]
    fn test_face_present_scan_order() {
        let mut outputs = stride_outputs(32, 2.0, 0, [1.0, 1.0, 1.0, 1.0]);
        outputs.extend(stride_outputs(8, 2.0, 5, [4.0, 4.0, 4.0, 4.0]));
        let table = group_outputs(&outputs);
        let candidate = first_candidate(&table).unwrap();
        assert_eq!(candidate.stride, 8);
    }

    #[test]
    fn test_face_present_low_scores() {
        let outputs = stride_outputs(8, -3.0, 0, [4.0, 4.0, 4.0, 4.0]);
        assert!(!face_present(&group_outputs(&outputs)));
    }

    #[test]
    fn test_truncated_bbox_tensor_yields_no_face() {
        let mut table = StrideTable::new();
        let scores = vec![5.0; 10];
        let bboxes = vec![4.0; 8]; // only two anchors' worth
        table.insert(
            8,
            StrideOutputs {
                scores: Some(&scores),
                bboxes: Some(&bboxes[..7]),
            },
        );
        // anchor 0 is complete and valid (32 px square)
        assert!(face_present(&table));

        let zeros = vec![0.0; 8];
        table.insert(
            8,
            StrideOutputs {
                scores: Some(&scores),
                bboxes: Some(&zeros[..7]),
            },
        );
        assert!(!face_present(&table));
    }

    #[test]
    fn test_random_accepted_candidates_respect_bounds() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let mut accepted = 0;
        for _ in 0..20_000 {
            let stride = SCRFD_STRIDES[rng.gen_range(0..3)];
            let logit: f32 = rng.gen_range(-4.0..4.0);
            let bbox: [f32; 4] = std::array::from_fn(|_| rng.gen_range(-2.0..25.0));
            if let Some(c) = decode_anchor(stride, logit, &bbox) {
                accepted += 1;
                assert!(c.probability >= 0.5);
                assert!(c.width() >= 20.0 && c.width() <= 640.0, "{c:?}");
                assert!(c.height() >= 20.0 && c.height() <= 640.0, "{c:?}");
                assert!((0.25..=4.0).contains(&c.aspect()), "{c:?}");
            }
        }
        assert!(accepted > 0);
    }

    #[test]
    fn test_random_tables_match_brute_force() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(9);
        for _ in 0..20 {
            let mut outputs = Vec::new();
            for stride in SCRFD_STRIDES {
                let n = expected_anchor_count(stride);
                let scores = (0..n).map(|_| rng.gen_range(-12.0..0.2)).collect();
                let boxes = (0..n * 4).map(|_| rng.gen_range(-1.0..3.0)).collect();
                outputs.push(tensor("s", n, 1, scores));
                outputs.push(tensor("b", n, 4, boxes));
            }
            let table = group_outputs(&outputs);
            let brute = outputs.chunks(2).any(|pair| {
                let stride = SCRFD_STRIDES
                    .into_iter()
                    .find(|&s| expected_anchor_count(s) == pair[0].shape[0])
                    .unwrap();
                pair[0]
                    .data
                    .iter()
                    .zip(pair[1].data.chunks_exact(4))
                    .any(|(&logit, bbox)| decode_anchor(stride, logit, bbox).is_some())
            });
            assert_eq!(face_present(&table), brute);
        }
    }
}
