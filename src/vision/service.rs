//! Remote OCR service backend
//!
//! Sends the frame as a base64 PNG to `POST {endpoint}/v1/ocr` and reads
//! back the recognized regions with their confidence scores.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageFormat};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::ocr::{OcrResult, TextRecognizer};
use crate::capture::frame::CapturedFrame;

#[derive(Serialize)]
struct OcrRequest<'a> {
    image: String,
    format: &'a str,
    language: &'a str,
}

#[derive(Debug, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    regions: Vec<OcrRegion>,
}

#[derive(Debug, Deserialize)]
struct OcrRegion {
    text: String,
    confidence: f32,
}

/// OCR backend that delegates to an HTTP service
pub struct ServiceOcr {
    client: Client,
    runtime: Runtime,
    endpoint: String,
    language: String,
}

impl ServiceOcr {
    /// Create a client for the service at `endpoint`
    pub fn new(endpoint: &str, language: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;
        let runtime = Runtime::new().context("Failed to create tokio runtime")?;
        let endpoint = endpoint.trim_end_matches('/').to_string();

        info!("OCR service configured: endpoint={}, language={}", endpoint, language);

        Ok(Self {
            client,
            runtime,
            endpoint,
            language: language.to_string(),
        })
    }

    async fn request(&self, image: String) -> Result<Vec<OcrResult>> {
        let request = OcrRequest {
            image,
            format: "png",
            language: &self.language,
        };

        let response = self
            .client
            .post(format!("{}/v1/ocr", self.endpoint))
            .json(&request)
            .send()
            .await
            .context("Failed to send OCR request")?;

        if !response.status().is_success() {
            anyhow::bail!("OCR service returned status {}", response.status());
        }

        let body: OcrResponse = response.json().await.context("Invalid OCR response")?;
        Ok(into_results(body))
    }
}

impl TextRecognizer for ServiceOcr {
    fn name(&self) -> &str {
        "service"
    }

    fn recognize(&self, frame: &CapturedFrame) -> Result<Vec<OcrResult>> {
        let encoded = encode_png_base64(frame)?;
        let results = self.runtime.block_on(self.request(encoded))?;
        debug!("OCR service returned {} region(s)", results.len());
        Ok(results)
    }
}

fn into_results(body: OcrResponse) -> Vec<OcrResult> {
    body.regions
        .into_iter()
        .map(|r| OcrResult::new(r.text, r.confidence))
        .collect()
}

/// Encode a frame as a base64 PNG
fn encode_png_base64(frame: &CapturedFrame) -> Result<String> {
    let img = frame
        .to_rgba_image()
        .context("Frame buffer does not match its dimensions")?;

    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut png, ImageFormat::Png)
        .context("Failed to encode frame as PNG")?;

    Ok(STANDARD.encode(png.into_inner()))
}
