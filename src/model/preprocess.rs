//! Frame to tensor conversion.

use crate::capture::Frame;
use crate::error::Result;
use crate::model::classifier::InputShape;
use image::imageops::FilterType;

/// Resize a frame to `shape` and lay it out as a planar `1×3×H×W` tensor
/// with values in `[0, 1]`.
pub fn frame_to_tensor(frame: &Frame, shape: InputShape) -> Result<Vec<f32>> {
    let image = frame.to_rgb_image()?;
    let image = if image.dimensions() == (shape.width, shape.height) {
        image
    } else {
        image::imageops::resize(&image, shape.width, shape.height, FilterType::Triangle)
    };

    let plane = shape.width as usize * shape.height as usize;
    let mut tensor = vec![0.0f32; plane * 3];
    for (i, pixel) in image.pixels().enumerate() {
        for (c, value) in pixel.0.iter().enumerate() {
            tensor[c * plane + i] = f32::from(*value) / 255.0;
        }
    }
    Ok(tensor)
}

/// In-place softmax. Leaves non-finite input untouched.
pub fn softmax(scores: &mut [f32]) {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return;
    }
    let mut sum = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }
    if sum > 0.0 {
        for s in scores.iter_mut() {
            *s /= sum;
        }
    }
}
