//! Detection and resolution pipeline
//!
//! Turns one frame into at most one resolved medicine:
//! extraction, then per-observation acceptance, then a single
//! classification call for the accepted name.
//!
//! Acceptance walks observations in extractor order and stops at the first
//! one that qualifies:
//! - a catalog match (exact or fuzzy) is authoritative, or
//! - without a match, text with confidence above `min_confidence` and more
//!   than `min_text_len` characters is accepted as an unverified name.
//!
//! There is no ranking across observations; a later, better-scoring
//! observation never displaces an earlier accepted one.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::capture::frame::CapturedFrame;
use crate::catalog::{Catalog, DEFAULT_MATCH_THRESHOLD};
use crate::classify::{Classification, Classifier};
use crate::vision::{Observation, TextExtractor};

/// Acceptance thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionPolicy {
    /// Minimum fuzzy score (0 - 100) for a catalog match
    pub match_threshold: u8,
    /// Unverified text must have confidence strictly above this
    pub min_confidence: f32,
    /// Unverified text must be strictly longer than this many characters
    pub min_text_len: usize,
}

impl Default for ResolutionPolicy {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            min_confidence: 0.7,
            min_text_len: 3,
        }
    }
}

/// How an accepted name was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameSource {
    /// Confirmed against the catalog
    Catalog,
    /// High-confidence OCR text with no catalog match
    Ocr,
}

impl fmt::Display for NameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameSource::Catalog => write!(f, "catalog"),
            NameSource::Ocr => write!(f, "unverified OCR"),
        }
    }
}

/// An accepted name awaiting classification
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub name: String,
    pub source: NameSource,
}

/// Final accepted name plus its classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedMedicine {
    pub name: String,
    pub source: NameSource,
    pub classification: Classification,
    pub resolved_at: DateTime<Local>,
}

impl ResolvedMedicine {
    /// Multi-line summary for presentation
    pub fn detailed_info(&self) -> String {
        format!("Medicine: {}\n{}", self.name, self.classification)
    }
}

/// Extraction, matching and classification for a single frame
pub struct ResolutionPipeline {
    extractor: TextExtractor,
    catalog: Catalog,
    classifier: Classifier,
    policy: ResolutionPolicy,
}

impl ResolutionPipeline {
    pub fn new(
        extractor: TextExtractor,
        catalog: Catalog,
        classifier: Classifier,
        policy: ResolutionPolicy,
    ) -> Self {
        Self {
            extractor,
            catalog,
            classifier,
            policy,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Mutable catalog access; only call between frames
    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn extractor(&self) -> &TextExtractor {
        &self.extractor
    }

    /// Find the first acceptable name in a frame, without classifying it
    pub fn detect(&self, frame: &CapturedFrame) -> Option<Candidate> {
        let observations = self.extractor.extract(frame);
        self.select(&observations)
    }

    /// Apply the acceptance policy to already extracted observations
    pub fn select(&self, observations: &[Observation]) -> Option<Candidate> {
        if observations.is_empty() {
            debug!("No text extracted from frame");
            return None;
        }

        for observation in observations {
            debug!(
                "Detected text: '{}' (confidence: {:.2})",
                observation.text, observation.confidence
            );

            let cleaned = observation.text.trim();

            if let Some(name) = self.catalog.search(cleaned, self.policy.match_threshold) {
                return Some(Candidate {
                    name,
                    source: NameSource::Catalog,
                });
            }

            if observation.confidence > self.policy.min_confidence
                && cleaned.chars().count() > self.policy.min_text_len
            {
                return Some(Candidate {
                    name: cleaned.to_string(),
                    source: NameSource::Ocr,
                });
            }
        }

        debug!("No observation passed the acceptance policy");
        None
    }

    /// Classify an accepted candidate
    pub fn classify_candidate(&self, candidate: Candidate) -> ResolvedMedicine {
        info!("Medicine detected: {} ({})", candidate.name, candidate.source);

        let classification = self.classifier.classify(&candidate.name);

        ResolvedMedicine {
            name: candidate.name,
            source: candidate.source,
            classification,
            resolved_at: Local::now(),
        }
    }

    /// Resolve a frame into a classified medicine
    pub fn resolve(&self, frame: &CapturedFrame) -> Option<ResolvedMedicine> {
        let candidate = self.detect(frame)?;
        Some(self.classify_candidate(candidate))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::classify::ERROR_TYPE;
    use crate::testing::{blank_frame, FailingRecognizer, FakeRecognizer, FakeService};
    use crate::vision::TextRecognizer;
    use std::cell::Cell;
    use std::rc::Rc;

    const ANALGESIC: &str = "Type: Analgesic\nUse: Pain relief\nClass: NSAID\nForm: Tablet";

    pub(crate) fn pipeline_with(
        recognizer: Box<dyn TextRecognizer>,
        service: FakeService,
    ) -> (ResolutionPipeline, Rc<Cell<usize>>) {
        let calls = service.calls();
        let pipeline = ResolutionPipeline::new(
            TextExtractor::new(recognizer, 0.5),
            Catalog::new(["Aspirin", "Ibuprofen", "Paracetamol"]),
            Classifier::new(Box::new(service)),
            ResolutionPolicy::default(),
        );
        (pipeline, calls)
    }

    fn observing(results: &[(&str, f32)]) -> (ResolutionPipeline, Rc<Cell<usize>>) {
        pipeline_with(
            Box::new(FakeRecognizer::new(results)),
            FakeService::replying(ANALGESIC),
        )
    }

    #[test]
    fn test_no_observations_is_absent_without_classifying() {
        let (pipeline, calls) = observing(&[]);
        assert!(pipeline.resolve(&blank_frame()).is_none());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_extraction_failure_is_absent() {
        let (pipeline, calls) =
            pipeline_with(Box::new(FailingRecognizer), FakeService::replying(ANALGESIC));
        assert!(pipeline.resolve(&blank_frame()).is_none());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_fuzzy_corrected_catalog_name() {
        let (pipeline, calls) = observing(&[("Aspirn", 0.6)]);
        let resolved = pipeline.resolve(&blank_frame()).unwrap();
        assert_eq!(resolved.name, "Aspirin");
        assert_eq!(resolved.source, NameSource::Catalog);
        assert_eq!(resolved.classification.medicine_type, "Analgesic");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_high_confidence_unverified_name() {
        let (pipeline, _) = observing(&[("XYZ123", 0.9)]);
        let resolved = pipeline.resolve(&blank_frame()).unwrap();
        assert_eq!(resolved.name, "XYZ123");
        assert_eq!(resolved.source, NameSource::Ocr);
    }

    #[test]
    fn test_short_text_rejected() {
        let (pipeline, calls) = observing(&[("ab", 0.95)]);
        assert!(pipeline.resolve(&blank_frame()).is_none());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_thresholds_are_strict() {
        // Exactly 0.7 confidence or exactly 3 characters is not enough
        let (pipeline, _) = observing(&[("Zolpidem", 0.7), ("QRS", 0.99)]);
        assert!(pipeline.detect(&blank_frame()).is_none());
    }

    #[test]
    fn test_unverified_name_is_trimmed() {
        let (pipeline, _) = observing(&[("  Zolpidem  ", 0.9)]);
        let candidate = pipeline.detect(&blank_frame()).unwrap();
        assert_eq!(candidate.name, "Zolpidem");
    }

    #[test]
    fn test_first_acceptable_observation_wins() {
        // The unverified first observation stops the scan before the exact match
        let (pipeline, _) = observing(&[("Batch 2231", 0.95), ("Ibuprofen", 0.99)]);
        let candidate = pipeline.detect(&blank_frame()).unwrap();
        assert_eq!(
            candidate,
            Candidate {
                name: "Batch 2231".to_string(),
                source: NameSource::Ocr
            }
        );
    }

    #[test]
    fn test_skips_until_catalog_match() {
        let (pipeline, _) = observing(&[("mg", 0.99), ("tabs", 0.6), ("PARACETAMOL", 0.55)]);
        let candidate = pipeline.detect(&blank_frame()).unwrap();
        assert_eq!(candidate.name, "Paracetamol");
        assert_eq!(candidate.source, NameSource::Catalog);
    }

    #[test]
    fn test_policy_is_configurable() {
        let mut pipeline = observing(&[("Aspirn", 0.6)]).0;
        pipeline.policy = ResolutionPolicy {
            match_threshold: 95,
            ..ResolutionPolicy::default()
        };
        assert!(pipeline.detect(&blank_frame()).is_none());
    }

    #[test]
    fn test_classification_failure_is_degraded() {
        let (pipeline, calls) = pipeline_with(
            Box::new(FakeRecognizer::new(&[("Ibuprofen", 0.9)])),
            FakeService::failing("timeout"),
        );
        let resolved = pipeline.resolve(&blank_frame()).unwrap();
        assert_eq!(resolved.name, "Ibuprofen");
        assert_eq!(resolved.classification.medicine_type, ERROR_TYPE);
        assert!(resolved.classification.primary_use.contains("timeout"));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_classifies_accepted_name() {
        let service = FakeService::replying(ANALGESIC);
        let names = service.names();
        let (pipeline, _) =
            pipeline_with(Box::new(FakeRecognizer::new(&[("ibuprofen", 0.9)])), service);
        pipeline.resolve(&blank_frame()).unwrap();
        assert_eq!(names.borrow().as_slice(), &["Ibuprofen".to_string()]);
    }

    #[test]
    fn test_runtime_catalog_append() {
        let (mut pipeline, _) = observing(&[("Cetirizin", 0.6)]);
        assert!(pipeline.detect(&blank_frame()).is_none());

        pipeline.catalog_mut().add("Cetirizine");
        let candidate = pipeline.detect(&blank_frame()).unwrap();
        assert_eq!(candidate.name, "Cetirizine");
    }

    #[test]
    fn test_select_reuses_observations() {
        let (pipeline, calls) = observing(&[]);
        let observations = vec![
            Observation::new("250 mg", 0.99),
            Observation::new("Omeprazol", 0.6),
            Observation::new("Ibuprofen", 0.9),
        ];
        // "250 mg" is long and confident enough to stop the scan
        let candidate = pipeline.select(&observations).unwrap();
        assert_eq!(candidate.name, "250 mg");
        assert!(pipeline.select(&observations[1..2]).is_none());

        let resolved = pipeline.classify_candidate(pipeline.select(&observations[2..]).unwrap());
        assert_eq!(resolved.name, "Ibuprofen");
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_detailed_info() {
        let (pipeline, _) = observing(&[("Aspirin", 0.9)]);
        let resolved = pipeline.resolve(&blank_frame()).unwrap();
        let info = resolved.detailed_info();
        assert!(info.starts_with("Medicine: Aspirin\nType: Analgesic"));
        assert!(info.ends_with("Common Form: Tablet"));
    }
}
