//! Frame data structures for captured camera content

use image::{DynamicImage, RgbImage, RgbaImage};
use std::time::Instant;

/// A captured frame from the camera feed
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl CapturedFrame {
    /// Create a new captured frame
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    /// Create a frame from a decoded image
    pub fn from_image(image: DynamicImage) -> Self {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new(rgba.into_raw(), width, height)
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// View the frame as an RGBA image.
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Convert to RGB8, the layout the OCR engines expect
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        self.to_rgba_image()
            .map(|img| DynamicImage::ImageRgba8(img).to_rgb8())
    }
}
