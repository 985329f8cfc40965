//! Decoded frame type and the bounded resize applied before inference.

use image::imageops::FilterType;
use image::{ImageFormat, RgbImage};
use std::io::Cursor;
use thiserror::Error;

/// Frames are bounded to this size (aspect-preserving) before inference.
pub const MAX_FRAME_WIDTH: u32 = 640;
pub const MAX_FRAME_HEIGHT: u32 = 480;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("buffer length mismatch: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("encode failed: {0}")]
    Encode(String),
}

/// A decoded RGB frame.
#[derive(Clone)]
pub struct Frame {
    image: RgbImage,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .finish()
    }
}

impl Frame {
    /// Decode an encoded image (JPEG, PNG, ...) into an RGB frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let decoded =
            image::load_from_memory(bytes).map_err(|e| FrameError::InvalidImage(e.to_string()))?;
        Self::from_image(decoded.to_rgb8())
    }

    /// Wrap raw packed RGB pixels.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        let image = RgbImage::from_raw(width, height, data).ok_or(FrameError::InvalidLength {
            expected,
            actual: 0,
        })?;
        Self::from_image(image)
    }

    fn from_image(image: RgbImage) -> Result<Self, FrameError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(FrameError::InvalidImage("zero-sized image".into()));
        }
        Ok(Self { image })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn area(&self) -> f32 {
        self.width() as f32 * self.height() as f32
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Downscale to fit within `max_width` × `max_height`, keeping the aspect ratio.
    /// Frames that already fit are returned unchanged.
    pub fn bounded(self, max_width: u32, max_height: u32) -> Self {
        let (w, h) = (self.width(), self.height());
        let scale = (max_width as f32 / w as f32)
            .min(max_height as f32 / h as f32)
            .min(1.0);
        if scale >= 1.0 {
            return self;
        }
        let new_w = ((w as f32 * scale).round() as u32).max(1);
        let new_h = ((h as f32 * scale).round() as u32).max(1);
        tracing::trace!(from = ?(w, h), to = ?(new_w, new_h), "bounding frame");
        Self {
            image: image::imageops::resize(&self.image, new_w, new_h, FilterType::Triangle),
        }
    }

    /// Bound to the default inference size.
    pub fn bounded_default(self) -> Self {
        self.bounded(MAX_FRAME_WIDTH, MAX_FRAME_HEIGHT)
    }

    /// Re-encode as JPEG, for delegating to an external service.
    pub fn to_jpeg(&self) -> Result<Vec<u8>, FrameError> {
        let mut out = Cursor::new(Vec::new());
        self.image
            .write_to(&mut out, ImageFormat::Jpeg)
            .map_err(|e| FrameError::Encode(e.to_string()))?;
        Ok(out.into_inner())
    }
}
