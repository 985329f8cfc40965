//! Tensor preparation shared by the ONNX models: letterboxing and face crops.

use crate::frame::Frame;
use crate::types::BoundingBox;
use image::imageops::FilterType;
use ndarray::Array4;

/// Metadata for coordinate de-mapping after a letterbox resize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Fit `src_w × src_h` inside `dst_w × dst_h`, centered.
    pub fn fit(src_w: u32, src_h: u32, dst_w: usize, dst_h: usize) -> Self {
        let scale = (dst_w as f32 / src_w as f32).min(dst_h as f32 / src_h as f32);
        let new_w = (src_w as f32 * scale).round();
        let new_h = (src_h as f32 * scale).round();
        Self {
            scale,
            pad_x: (dst_w as f32 - new_w) / 2.0,
            pad_y: (dst_h as f32 - new_h) / 2.0,
        }
    }

    /// Map a point from letterboxed input space back to frame space.
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Letterbox an RGB frame into a `1×3×H×W` tensor.
///
/// Pad pixels take `pad_value` before `normalize` is applied, so a pad equal to the
/// model mean normalizes to zero.
pub fn letterbox_nchw(
    frame: &Frame,
    input_width: usize,
    input_height: usize,
    pad_value: f32,
    normalize: impl Fn(f32) -> f32,
) -> (Array4<f32>, Letterbox) {
    let letterbox = Letterbox::fit(frame.width(), frame.height(), input_width, input_height);
    let new_w = ((frame.width() as f32 * letterbox.scale).round() as usize).clamp(1, input_width);
    let new_h = ((frame.height() as f32 * letterbox.scale).round() as usize).clamp(1, input_height);
    let resized = image::imageops::resize(
        frame.image(),
        new_w as u32,
        new_h as u32,
        FilterType::Triangle,
    );

    let pad_x_start = letterbox.pad_x.floor() as usize;
    let pad_y_start = letterbox.pad_y.floor() as usize;
    let pad = normalize(pad_value);

    let mut tensor = Array4::<f32>::from_elem((1, 3, input_height, input_width), pad);
    for (x, y, pixel) in resized.enumerate_pixels() {
        let tx = x as usize + pad_x_start;
        let ty = y as usize + pad_y_start;
        if tx >= input_width || ty >= input_height {
            continue;
        }
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = normalize(pixel.0[c] as f32);
        }
    }

    (tensor, letterbox)
}

/// Square crop around a face box, enlarged by `margin` and clamped to the frame.
pub fn face_crop_region(frame: &Frame, face: &BoundingBox, margin: f32) -> BoundingBox {
    let side = face.width.max(face.height) * (1.0 + margin);
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let x0 = (cx - side / 2.0).max(0.0);
    let y0 = (cy - side / 2.0).max(0.0);
    let x1 = (cx + side / 2.0).min(frame.width() as f32);
    let y1 = (cy + side / 2.0).min(frame.height() as f32);

    BoundingBox {
        x: x0,
        y: y0,
        width: (x1 - x0).max(1.0),
        height: (y1 - y0).max(1.0),
    }
}

/// Crop `region` out of the frame and stretch it into a `1×3×size×size` tensor.
pub fn crop_nchw(
    frame: &Frame,
    region: &BoundingBox,
    size: usize,
    normalize: impl Fn(f32) -> f32,
) -> Array4<f32> {
    let x = (region.x.max(0.0) as u32).min(frame.width() - 1);
    let y = (region.y.max(0.0) as u32).min(frame.height() - 1);
    let w = (region.width.round() as u32).clamp(1, frame.width() - x);
    let h = (region.height.round() as u32).clamp(1, frame.height() - y);

    let cropped = image::imageops::crop_imm(frame.image(), x, y, w, h).to_image();
    let resized = image::imageops::resize(&cropped, size as u32, size as u32, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (px, py, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, py as usize, px as usize]] = normalize(pixel.0[c] as f32);
        }
    }
    tensor
}
