//! Vision/OCR Layer
//!
//! Performs text extraction on captured frames.
//! Supports multiple OCR backends:
//! - Local `ocrs` engine (models downloaded on first use)
//! - Remote OCR service over HTTP

pub mod models;
pub mod ocr;
pub mod ocr_preprocess;
pub mod service;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::capture::frame::CapturedFrame;
use crate::config::OcrPreprocessing;

pub use models::{ModelManager, ModelType};
pub use ocr::{LocalOcr, TextRecognizer};
pub use ocr_preprocess::preprocess_frame;
pub use service::ServiceOcr;

/// OCR backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackend {
    /// Local `ocrs` engine
    #[default]
    Local,
    /// Remote OCR service
    Service,
}

/// Configuration for text extraction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// OCR backend to use
    pub backend: OcrBackend,
    /// Minimum confidence for an observation to be kept (0.0 - 1.0)
    pub confidence_threshold: f32,
    /// Language hint passed to the OCR service
    pub language: String,
    /// OCR service base URL (service backend only)
    pub service_endpoint: String,
    /// OCR service request timeout in seconds
    pub service_timeout_secs: u64,
    /// Directory holding the local models; defaults to the app data directory
    pub models_dir: Option<PathBuf>,
    /// Frame preprocessing before recognition
    pub preprocessing: OcrPreprocessing,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackend::Local,
            confidence_threshold: 0.5,
            language: "en".to_string(),
            service_endpoint: "http://127.0.0.1:8080".to_string(),
            service_timeout_secs: 10,
            models_dir: None,
            preprocessing: OcrPreprocessing::default(),
        }
    }
}

/// One OCR-extracted text token with its confidence
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub text: String,
    pub confidence: f32,
}

impl Observation {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Build the recognizer selected by the configuration.
///
/// The local backend downloads its models on first use.
pub fn build_recognizer(config: &VisionConfig) -> Result<Box<dyn TextRecognizer>> {
    match config.backend {
        OcrBackend::Local => {
            let manager = match &config.models_dir {
                Some(dir) => ModelManager::with_dir(dir.clone())?,
                None => ModelManager::new()?,
            };
            let det_path = manager.ensure_model(ModelType::Detection)?;
            let rec_path = manager.ensure_model(ModelType::Recognition)?;
            let engine = LocalOcr::new(&det_path, &rec_path)
                .context("Failed to initialize local OCR engine")?;
            Ok(Box::new(engine))
        }
        OcrBackend::Service => {
            let engine = ServiceOcr::new(
                &config.service_endpoint,
                &config.language,
                Duration::from_secs(config.service_timeout_secs),
            )?;
            Ok(Box::new(engine))
        }
    }
}

/// Best-effort text extraction over an OCR backend
pub struct TextExtractor {
    recognizer: Box<dyn TextRecognizer>,
    confidence_threshold: f32,
    preprocessing: OcrPreprocessing,
}

impl TextExtractor {
    /// Create an extractor keeping observations at or above `confidence_threshold`
    pub fn new(recognizer: Box<dyn TextRecognizer>, confidence_threshold: f32) -> Self {
        Self {
            recognizer,
            confidence_threshold,
            preprocessing: OcrPreprocessing::default(),
        }
    }

    /// Create an extractor from configuration
    pub fn with_config(recognizer: Box<dyn TextRecognizer>, config: &VisionConfig) -> Self {
        info!(
            "Text extractor using {} backend (confidence >= {})",
            recognizer.name(),
            config.confidence_threshold
        );
        Self {
            preprocessing: config.preprocessing.clone(),
            ..Self::new(recognizer, config.confidence_threshold)
        }
    }

    /// Extract observations from a frame, in engine order.
    ///
    /// Engine failures are logged and yield an empty list.
    pub fn extract(&self, frame: &CapturedFrame) -> Vec<Observation> {
        let start = Instant::now();

        let processed = preprocess_frame(frame, &self.preprocessing);
        let frame = processed.as_ref().unwrap_or(frame);

        let results = match self.recognizer.recognize(frame) {
            Ok(results) => results,
            Err(e) => {
                warn!("Error reading text from frame ({}): {:#}", self.recognizer.name(), e);
                return Vec::new();
            }
        };

        let observations: Vec<Observation> = results
            .into_iter()
            .filter(|r| r.confidence >= self.confidence_threshold)
            .map(|r| Observation::new(r.text, r.confidence))
            .collect();

        debug!(
            "Extracted {} text item(s) from frame in {:?}",
            observations.len(),
            start.elapsed()
        );
        observations
    }
}

/// All observation text joined by `separator`
pub fn all_text(observations: &[Observation], separator: &str) -> String {
    observations
        .iter()
        .map(|o| o.text.as_str())
        .collect::<Vec<_>>()
        .join(separator)
}

/// The most confident observation; the earliest wins on ties
pub fn highest_confidence(observations: &[Observation]) -> Option<&Observation> {
    observations.iter().fold(None, |best, obs| match best {
        Some(b) if b.confidence >= obs.confidence => Some(b),
        _ => Some(obs),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{blank_frame, FailingRecognizer, FakeRecognizer};

    #[test]
    fn test_default_vision_config() {
        let config = VisionConfig::default();
        assert_eq!(config.backend, OcrBackend::Local);
        assert!((config.confidence_threshold - 0.5).abs() < 0.001);
        assert!(!config.preprocessing.enabled);
    }

    #[test]
    fn test_extract_filters_by_threshold_and_keeps_order() {
        let recognizer = FakeRecognizer::new(&[("ASPIRIN", 0.9), ("noise", 0.3), ("500mg", 0.5)]);
        let extractor = TextExtractor::new(Box::new(recognizer), 0.5);

        let observations = extractor.extract(&blank_frame());
        assert_eq!(
            observations,
            vec![Observation::new("ASPIRIN", 0.9), Observation::new("500mg", 0.5)]
        );
    }

    #[test]
    fn test_extract_failure_is_empty() {
        let extractor = TextExtractor::new(Box::new(FailingRecognizer), 0.5);
        assert!(extractor.extract(&blank_frame()).is_empty());
    }

    #[test]
    fn test_all_text() {
        let recognizer = FakeRecognizer::new(&[("Ibuprofen", 0.8), ("200", 0.7), ("x", 0.1)]);
        let extractor = TextExtractor::new(Box::new(recognizer), 0.5);
        let observations = extractor.extract(&blank_frame());
        assert_eq!(all_text(&observations, " "), "Ibuprofen 200");
        assert_eq!(all_text(&[], " "), "");
    }

    #[test]
    fn test_highest_confidence_first_on_ties() {
        let observations = vec![
            Observation::new("a", 0.6),
            Observation::new("b", 0.9),
            Observation::new("c", 0.9),
        ];
        assert_eq!(highest_confidence(&observations).unwrap().text, "b");
        assert!(highest_confidence(&[]).is_none());
    }

    #[test]
    fn test_backend_serde_names() {
        let backend: OcrBackend = serde_json::from_str("\"service\"").unwrap();
        assert_eq!(backend, OcrBackend::Service);
    }
}
