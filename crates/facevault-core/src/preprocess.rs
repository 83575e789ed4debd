//! Image normalization for the detector and recognizer inputs.
//!
//! Both networks take the whole image squashed to a square (no letterbox),
//! as planar R, G, B planes scaled to [-1, 1].

use crate::error::PipelineError;
use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array3;

/// SCRFD input side length.
pub const DETECTION_INPUT_SIZE: usize = 640;
/// ArcFace input side length.
pub const EMBEDDING_INPUT_SIZE: usize = 112;

const PIXEL_SCALE: f32 = 255.0;
const CHANNEL_MEAN: f32 = 0.5;
const CHANNEL_STD: f32 = 0.5;

/// A `(3, S, S)` channel-major float tensor.
pub type NormalizedTensor = Array3<f32>;

/// Decode encoded image bytes.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    Ok(image::load_from_memory(bytes)?)
}

/// Decode `bytes` and normalize to a `(3, size, size)` tensor.
pub fn normalize(bytes: &[u8], size: usize) -> Result<NormalizedTensor, PipelineError> {
    let image = decode(bytes)?;
    Ok(normalize_image(&image, size))
}

/// Resize an already-decoded image to `size`×`size` and normalize it.
pub fn normalize_image(image: &DynamicImage, size: usize) -> NormalizedTensor {
    let side = size as u32;
    let rgba = image.resize_exact(side, side, FilterType::Triangle).to_rgba8();

    let mut tensor = Array3::<f32>::zeros((3, size, size));
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        // Alpha (channel 3) is dropped.
        for c in 0..3 {
            tensor[[c, y, x]] = normalize_sample(pixel[c]);
        }
    }
    tensor
}

#[inline]
fn normalize_sample(sample: u8) -> f32 {
    (sample as f32 / PIXEL_SCALE - CHANNEL_MEAN) / CHANNEL_STD
}
