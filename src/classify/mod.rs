//! Medicine classification
//!
//! Turns an accepted medicine name into structured attributes by asking an
//! external knowledge service. The service returns free-form text with one
//! `Key: value` pair per line; see [`parse_response`].
//!
//! [`Classifier::classify`] never fails: any service error becomes a
//! degraded [`Classification`] whose type is [`ERROR_TYPE`].

pub mod openai;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{error, info};

pub use openai::{ChatClassifier, ClassifierConfig};

/// Value used for any attribute the service did not provide
pub const UNKNOWN: &str = "Unknown";

/// Type reported when the classification call failed
pub const ERROR_TYPE: &str = "Error";

/// Reasons a classification call can fail
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("service response contained no choices")]
    EmptyResponse,
    #[error("{0}")]
    Other(String),
}

/// Structured attributes of a medicine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Medicine type (Analgesic, Antibiotic, ...)
    #[serde(rename = "type")]
    pub medicine_type: String,
    /// What the medicine is used for
    pub primary_use: String,
    /// Pharmacological class
    pub drug_class: String,
    /// Physical form (Tablet, Syrup, ...)
    pub form: String,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            medicine_type: UNKNOWN.to_string(),
            primary_use: UNKNOWN.to_string(),
            drug_class: UNKNOWN.to_string(),
            form: UNKNOWN.to_string(),
        }
    }
}

impl Classification {
    /// Sentinel produced when the service call failed
    pub fn degraded(err: &ClassifyError) -> Self {
        Self {
            medicine_type: ERROR_TYPE.to_string(),
            primary_use: format!("Failed to analyze: {}", err),
            ..Self::default()
        }
    }

    /// Whether this is the failure sentinel
    pub fn is_error(&self) -> bool {
        self.medicine_type == ERROR_TYPE
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Type: {}", self.medicine_type)?;
        writeln!(f, "Primary Use: {}", self.primary_use)?;
        writeln!(f, "Drug Class: {}", self.drug_class)?;
        write!(f, "Common Form: {}", self.form)
    }
}

/// Parse the labelled lines of a service response.
///
/// Keys are matched case-insensitively on the text before the first colon.
/// Unrecognised lines are skipped and missing keys stay [`UNKNOWN`].
pub fn parse_response(text: &str) -> Classification {
    let mut info = Classification::default();

    for line in text.lines() {
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim().to_lowercase().as_str() {
            "type" => info.medicine_type = value,
            "use" => info.primary_use = value,
            "class" => info.drug_class = value,
            "form" => info.form = value,
            _ => {}
        }
    }

    info
}

/// Remote knowledge service that describes a medicine in free-form text
pub trait ClassificationService {
    /// Ask the service about a medicine; returns the raw response text
    fn remote_classify(&self, name: &str) -> Result<String, ClassifyError>;
}

/// Classifier over a remote service
pub struct Classifier {
    service: Box<dyn ClassificationService>,
}

impl Classifier {
    /// Create a classifier backed by the given service
    pub fn new(service: Box<dyn ClassificationService>) -> Self {
        Self { service }
    }

    /// Classify a name, reporting service failures to the caller
    pub fn try_classify(&self, name: &str) -> Result<Classification, ClassifyError> {
        let raw = self.service.remote_classify(name)?;
        Ok(parse_response(&raw))
    }

    /// Classify a name. Failures degrade to the error sentinel.
    pub fn classify(&self, name: &str) -> Classification {
        info!("Classifying medicine: {}", name);
        match self.try_classify(name) {
            Ok(classification) => {
                info!(
                    "Classified {} - Type: {}",
                    name, classification.medicine_type
                );
                classification
            }
            Err(e) => {
                error!("Error classifying {}: {}", name, e);
                Classification::degraded(&e)
            }
        }
    }
}
