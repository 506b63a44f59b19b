use image::{codecs::jpeg::JpegEncoder, imageops, imageops::FilterType, Rgb, RgbImage};
use thiserror::Error;

use crate::camera::Resolution;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Off-screen frame buffer the camera frames are drawn into before upload
#[derive(Debug, Clone)]
pub struct Canvas {
    image: RgbImage,
}

impl Canvas {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            image: RgbImage::new(resolution.width.max(1), resolution.height.max(1)),
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.image.width(), self.image.height())
    }

    /// Match the canvas to the stream's native size, discarding its contents
    pub fn resize(&mut self, resolution: Resolution) {
        if self.resolution() != resolution {
            *self = Self::new(resolution);
        }
    }

    /// Draw a frame, scaling it to the canvas size when they differ
    pub fn draw(&mut self, frame: &RgbImage) {
        if frame.dimensions() == self.image.dimensions() {
            self.image.copy_from_slice(frame.as_raw());
        } else {
            self.image = imageops::resize(
                frame,
                self.image.width(),
                self.image.height(),
                FilterType::Triangle,
            );
        }
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(&self.image)?;
        Ok(buf)
    }

    pub fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgb([0, 0, 0]);
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new(Resolution::new(1, 1))
    }
}
