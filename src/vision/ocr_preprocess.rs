//! Image preprocessing filters for OCR optimization
//!
//! Optional enhancements that help with glossy packaging, small print and
//! light-on-dark labels.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::{debug, warn};

use crate::capture::frame::CapturedFrame;
use crate::config::OcrPreprocessing;

/// Apply preprocessing to a frame according to settings.
///
/// Order: upscale, contrast, grayscale, invert. Returns `None` when
/// preprocessing is disabled or the frame buffer is malformed, in which case
/// the caller should use the original frame. An upscale whose size does
/// not fit in `u32` is skipped the same way.
pub fn preprocess_frame(frame: &CapturedFrame, settings: &OcrPreprocessing) -> Option<CapturedFrame> {
    if !settings.enabled {
        return None;
    }

    debug!(
        "OCR preprocessing: grayscale={}, invert={}, contrast={}, scale={}",
        settings.grayscale, settings.invert, settings.contrast, settings.scale
    );

    let mut img = frame.to_rgba_image()?;

    if settings.scale > 1 {
        let (Some(width), Some(height)) = (
            frame.width.checked_mul(settings.scale),
            frame.height.checked_mul(settings.scale),
        ) else {
            warn!(
                "OCR upscale x{} overflows a {}x{} frame; skipping preprocessing",
                settings.scale, frame.width, frame.height
            );
            return None;
        };
        img = imageops::resize(&img, width, height, FilterType::Triangle);
    }

    if (settings.contrast - 1.0).abs() > 0.01 {
        apply_contrast(&mut img, settings.contrast);
    }

    if settings.grayscale {
        apply_grayscale(&mut img);
    }

    if settings.invert {
        apply_invert(&mut img);
    }

    let (width, height) = img.dimensions();
    Some(CapturedFrame {
        data: img.into_raw(),
        width,
        height,
        timestamp: frame.timestamp,
    })
}

/// Scale contrast around mid-grey. Factor > 1.0 increases contrast.
fn apply_contrast(img: &mut RgbaImage, factor: f32) {
    for pixel in img.pixels_mut() {
        for channel in pixel.0.iter_mut().take(3) {
            *channel = ((*channel as f32 - 128.0) * factor + 128.0).clamp(0.0, 255.0) as u8;
        }
    }
}

/// Luminance grayscale, keeping the RGBA layout
fn apply_grayscale(img: &mut RgbaImage) {
    for pixel in img.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        let gray = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) as u8;
        pixel.0[0] = gray;
        pixel.0[1] = gray;
        pixel.0[2] = gray;
    }
}

/// Invert RGB colors (light text on dark labels)
fn apply_invert(img: &mut RgbaImage) {
    for pixel in img.pixels_mut() {
        for channel in pixel.0.iter_mut().take(3) {
            *channel = 255 - *channel;
        }
    }
}
