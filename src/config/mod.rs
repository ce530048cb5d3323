//! Application Configuration
//!
//! User settings stored in TOML format. Every section has defaults, so a
//! partial file (or none at all) is valid. Each component receives its own
//! section in its constructor.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::capture::CaptureConfig;
use crate::catalog::CatalogConfig;
use crate::classify::ClassifierConfig;
use crate::pipeline::ResolutionPolicy;
use crate::scanner::ScannerConfig;
use crate::vision::VisionConfig;

/// Environment variable overriding `classifier.api_key`
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Fatal configuration problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to write config {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("API key not found; set classifier.api_key in the config file or the OPENAI_API_KEY environment variable")]
    MissingApiKey,
}

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Classification service settings
    pub classifier: ClassifierConfig,
    /// OCR settings
    pub ocr: VisionConfig,
    /// Catalog source
    pub catalog: CatalogConfig,
    /// Acceptance policy thresholds
    pub resolution: ResolutionPolicy,
    /// Scan timing
    pub scanner: ScannerConfig,
    /// Frame source settings
    pub capture: CaptureConfig,
}

impl AppConfig {
    /// Apply environment overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_api_key_override(std::env::var(API_KEY_ENV).ok());
    }

    fn apply_api_key_override(&mut self, value: Option<String>) {
        if let Some(key) = value.filter(|k| !k.trim().is_empty()) {
            self.classifier.api_key = key;
            info!("API key loaded from environment variable");
        }
    }

    /// The API key, or an error if none is configured
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        let key = self.classifier.api_key.trim();
        if key.is_empty() {
            Err(ConfigError::MissingApiKey)
        } else {
            Ok(key)
        }
    }
}

/// Preprocessing applied to frames before OCR
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrPreprocessing {
    /// Master switch
    pub enabled: bool,
    /// Convert to grayscale
    pub grayscale: bool,
    /// Invert colors (light text on dark background)
    pub invert: bool,
    /// Contrast factor (1.0 = unchanged)
    pub contrast: f32,
    /// Integer upscale factor (1 = unchanged)
    pub scale: u32,
}

impl Default for OcrPreprocessing {
    fn default() -> Self {
        Self {
            enabled: false,
            grayscale: false,
            invert: false,
            contrast: 1.0,
            scale: 1,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve the configuration for this run.
///
/// An explicit path must exist and parse. Without one, the platform config
/// file is used if present, else defaults. Environment overrides apply last.
pub fn resolve_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match explicit {
        Some(path) => {
            let config = load_config(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => match default_config_path().filter(|p| p.exists()) {
            Some(path) => {
                let config = load_config(&path)?;
                info!("Loaded configuration from {:?}", path);
                config
            }
            None => {
                info!("Using default configuration");
                AppConfig::default()
            }
        },
    };
    config.apply_env_overrides();
    Ok(config)
}

/// `<platform config dir>/config.toml`, if the directory can be determined
pub fn default_config_path() -> Option<PathBuf> {
    crate::storage::get_config_dir()
        .ok()
        .map(|dir| dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::OcrBackend;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert!(config.classifier.api_key.is_empty());
        assert_eq!(config.classifier.model, "gpt-3.5-turbo");

        assert_eq!(config.ocr.backend, OcrBackend::Local);
        assert!((config.ocr.confidence_threshold - 0.5).abs() < 0.01);

        assert_eq!(config.resolution.match_threshold, 80);
        assert!((config.resolution.min_confidence - 0.7).abs() < 0.01);
        assert_eq!(config.resolution.min_text_len, 3);

        assert!((config.scanner.scan_interval_secs - 2.0).abs() < 0.01);
        assert!(config.scanner.auto_scan);

        assert_eq!(config.capture.max_fps, 10);
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.resolution.match_threshold = 90;
        config.ocr.backend = OcrBackend::Service;
        config.ocr.preprocessing.scale = 2;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.resolution.match_threshold, 90);
        assert_eq!(parsed.ocr.backend, OcrBackend::Service);
        assert_eq!(parsed.ocr.preprocessing.scale, 2);
        assert_eq!(parsed.classifier.max_tokens, config.classifier.max_tokens);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            "[scanner]\nscan_interval_secs = 5.0\n\n[resolution]\nmin_text_len = 4\n",
        )
        .unwrap();
        assert!((parsed.scanner.scan_interval_secs - 5.0).abs() < 0.01);
        assert!(parsed.scanner.auto_scan);
        assert_eq!(parsed.resolution.min_text_len, 4);
        assert_eq!(parsed.resolution.match_threshold, 80);
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();
        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(config.catalog.path, loaded.catalog.path);
        assert_eq!(config.capture.max_fps, loaded.capture.max_fps);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_explicit_missing_config_is_fatal() {
        assert!(resolve_config(Some(Path::new("/nonexistent/config.toml"))).is_err());
    }

    #[test]
    fn test_api_key_override() {
        let mut config = AppConfig::default();
        assert!(matches!(config.require_api_key(), Err(ConfigError::MissingApiKey)));

        config.apply_api_key_override(Some("   ".to_string()));
        assert!(config.require_api_key().is_err());

        config.apply_api_key_override(Some("sk-test".to_string()));
        assert_eq!(config.require_api_key().unwrap(), "sk-test");

        config.apply_api_key_override(None);
        assert_eq!(config.classifier.api_key, "sk-test");
    }
}
