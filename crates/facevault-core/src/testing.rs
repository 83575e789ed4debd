//! Deterministic stand-ins for the ONNX models, for tests that must run
//! without model files.
//!
//! [`SyntheticScrfd`] reports a face whenever the centre of the frame is
//! not dark, emitting outputs in the shuffled, unnamed layout real SCRFD
//! exports use. [`SyntheticArcface`] returns 4×4 block means per channel.

use crate::backend::{InferenceBackend, InferenceError, OutputTensor};
use crate::context::ModelContext;
use crate::detector::{expected_anchor_count, FaceDetector, SCRFD_DEFAULT_INPUT};
use crate::recognizer::{FaceRecognizer, ARCFACE_DEFAULT_INPUT};
use image::{ImageFormat, Rgba, RgbaImage};
use ndarray::{s, ArrayView4, Axis};
use std::io::Cursor;

/// Normalized mean above which the frame centre counts as "lit".
const LIT_THRESHOLD: f32 = -0.8;
const BLOCKS: usize = 4;

pub struct SyntheticScrfd;

impl InferenceBackend for SyntheticScrfd {
    fn input_name(&self) -> &str {
        SCRFD_DEFAULT_INPUT
    }

    fn run(&self, input: ArrayView4<'_, f32>) -> Result<Vec<OutputTensor>, InferenceError> {
        let (h, w) = (input.shape()[2], input.shape()[3]);
        let centre = input.slice(s![0, .., h / 4..3 * h / 4, w / 4..3 * w / 4]);
        let lit = centre.mean().unwrap_or(-1.0) > LIT_THRESHOLD;

        let mut outputs = Vec::new();
        // Deliberately not in stride order, with opaque names.
        for (i, stride) in [32usize, 8, 16].into_iter().enumerate() {
            let n = expected_anchor_count(stride);
            let mut scores = vec![-6.0f32; n];
            let mut boxes = vec![0.0f32; n * 4];
            if lit && stride == 16 {
                scores[0] = 4.0;
                boxes[..4].copy_from_slice(&[4.0, 5.0, 4.0, 5.0]);
            }
            outputs.push(OutputTensor::new(format!("{}", 440 + i * 3), vec![n, 4], boxes));
            outputs.push(OutputTensor::new(format!("{}", 441 + i * 3), vec![n, 1], scores));
            outputs.push(OutputTensor::new(
                format!("{}", 442 + i * 3),
                vec![n, 10],
                vec![0.0; n * 10],
            ));
        }
        Ok(outputs)
    }
}

pub struct SyntheticArcface;

impl InferenceBackend for SyntheticArcface {
    fn input_name(&self) -> &str {
        ARCFACE_DEFAULT_INPUT
    }

    fn run(&self, input: ArrayView4<'_, f32>) -> Result<Vec<OutputTensor>, InferenceError> {
        let size = input.shape()[2];
        let block = size / BLOCKS;
        let mut values = Vec::with_capacity(3 * BLOCKS * BLOCKS + 1);
        for plane in input.index_axis(Axis(0), 0).axis_iter(Axis(0)) {
            for by in 0..BLOCKS {
                for bx in 0..BLOCKS {
                    let cell = plane.slice(s![
                        by * block..(by + 1) * block,
                        bx * block..(bx + 1) * block
                    ]);
                    values.push(cell.mean().unwrap_or(0.0));
                }
            }
        }
        values.push(1.0);
        Ok(vec![OutputTensor::new("fc1", vec![1, values.len()], values)])
    }
}

/// A ready context backed by the synthetic models.
pub fn synthetic_context() -> ModelContext {
    let ctx = ModelContext::new();
    ctx.initialize(
        FaceDetector::with_backend(SyntheticScrfd),
        FaceRecognizer::with_backend(SyntheticArcface),
    )
    .expect("fresh context accepts its first initialisation");
    ctx
}

/// A PNG with a bright oval on a mid-grey background, seeded for variety.
pub fn face_png(seed: u8) -> Vec<u8> {
    let (w, h) = (160u32, 200u32);
    let img = RgbaImage::from_fn(w, h, |x, y| {
        let dx = (x as f32 - w as f32 / 2.0) / (w as f32 * 0.3);
        let dy = (y as f32 - h as f32 / 2.0) / (h as f32 * 0.35);
        if dx * dx + dy * dy <= 1.0 {
            Rgba([224, 172u8.wrapping_add(seed), 140, 255])
        } else {
            Rgba([90, 90, seed.wrapping_mul(7), 255])
        }
    });
    encode_png(&img)
}

/// A fully black PNG.
pub fn blank_png() -> Vec<u8> {
    encode_png(&RgbaImage::from_pixel(120, 120, Rgba([0, 0, 0, 255])))
}

fn encode_png(img: &RgbaImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .expect("in-memory PNG encoding cannot fail");
    buf.into_inner()
}
