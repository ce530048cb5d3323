//! OCR (Optical Character Recognition) module
//!
//! Defines the narrow interface the extractor consumes and the local
//! backend built on the `ocrs` engine.

use anyhow::{Context, Result};
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use std::path::Path;
use tracing::{debug, info};

use crate::capture::frame::CapturedFrame;

/// Single OCR detection result
#[derive(Debug, Clone, PartialEq)]
pub struct OcrResult {
    /// Recognized text
    pub text: String,
    /// Recognition confidence (0.0 - 1.0)
    pub confidence: f32,
}

impl OcrResult {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// An external OCR capability
pub trait TextRecognizer {
    /// Backend name for logging
    fn name(&self) -> &str;

    /// Recognize all text in a frame, in reading order
    fn recognize(&self, frame: &CapturedFrame) -> Result<Vec<OcrResult>>;
}

/// Local OCR engine using `ocrs` text detection and recognition models
pub struct LocalOcr {
    engine: OcrEngine,
}

impl LocalOcr {
    /// Initialize the engine with model paths
    pub fn new(detection_model: &Path, recognition_model: &Path) -> Result<Self> {
        info!(
            "Loading OCR models: detection={:?}, recognition={:?}",
            detection_model, recognition_model
        );

        let detection_model = Model::load_file(detection_model)
            .with_context(|| format!("Failed to load detection model {:?}", detection_model))?;
        let recognition_model = Model::load_file(recognition_model)
            .with_context(|| format!("Failed to load recognition model {:?}", recognition_model))?;

        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })?;

        info!("Local OCR engine initialized successfully");
        Ok(Self { engine })
    }
}

impl TextRecognizer for LocalOcr {
    fn name(&self) -> &str {
        "ocrs"
    }

    /// Run OCR on a frame.
    ///
    /// `ocrs` does not report per-line confidence, so every recognized line
    /// is given a confidence of 1.0.
    fn recognize(&self, frame: &CapturedFrame) -> Result<Vec<OcrResult>> {
        let img = frame
            .to_rgb_image()
            .context("Frame buffer does not match its dimensions")?;

        let source = ImageSource::from_bytes(img.as_raw(), img.dimensions())
            .map_err(|e| anyhow::anyhow!("Invalid OCR input image: {:?}", e))?;
        let input = self.engine.prepare_input(source)?;
        let text = self.engine.get_text(&input)?;

        let results: Vec<OcrResult> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| OcrResult::new(line, 1.0))
            .collect();

        debug!("ocrs recognized {} line(s)", results.len());
        Ok(results)
    }
}
