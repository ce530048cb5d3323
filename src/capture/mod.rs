//! Frame Acquisition Layer
//!
//! The camera driver lives outside this crate. Frames are pulled through the
//! [`FrameSource`] trait; [`ImageSequenceSource`] replays still images from
//! disk as if they were a live feed.

pub mod frame;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use frame::CapturedFrame;

/// File extensions accepted by the image sequence source
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Capture-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Image file or directory of images to replay as the feed
    pub source: Option<PathBuf>,
    /// Maximum frames per second to read
    pub max_fps: u32,
    /// Restart from the first image once the sequence is exhausted
    pub looping: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: None,
            max_fps: 10,
            looping: true,
        }
    }
}

/// Anything that can hand the scanner one frame at a time
pub trait FrameSource {
    /// Read the next frame. `Ok(None)` signals the end of the feed.
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>>;
}

/// Replays a single image or a directory of images in file name order
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    position: usize,
    looping: bool,
}

impl ImageSequenceSource {
    /// Open an image file or a directory of images
    pub fn open(path: &Path, looping: bool) -> Result<Self> {
        let paths = if path.is_dir() {
            let mut paths: Vec<PathBuf> = std::fs::read_dir(path)
                .with_context(|| format!("Failed to read frame directory {:?}", path))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_image_file(p))
                .collect();
            paths.sort();
            paths
        } else if path.is_file() {
            vec![path.to_path_buf()]
        } else {
            anyhow::bail!("Frame source not found: {:?}", path);
        };

        if paths.is_empty() {
            anyhow::bail!("No images found in {:?}", path);
        }

        info!("Frame source opened with {} image(s) from {:?}", paths.len(), path);

        Ok(Self {
            paths,
            position: 0,
            looping,
        })
    }

    /// Number of images in the sequence
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Image paths in playback order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
        if self.position >= self.paths.len() {
            if !self.looping {
                return Ok(None);
            }
            self.position = 0;
        }

        let path = &self.paths[self.position];
        self.position += 1;

        debug!("Reading frame from {:?}", path);
        let image = image::open(path)
            .with_context(|| format!("Failed to read frame from {:?}", path))?;

        Ok(Some(CapturedFrame::from_image(image)))
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
