//! Scan scheduling
//!
//! Decides when the pipeline runs and keeps the last resolved medicine.
//! A scan is either requested explicitly or triggered automatically once
//! the scan interval has elapsed since the previous attempt.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::capture::frame::CapturedFrame;
use crate::pipeline::{ResolutionPipeline, ResolvedMedicine};

const DEFAULT_SCAN_INTERVAL_SECS: f64 = 2.0;

/// Scan timing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Minimum seconds between automatic scans
    pub scan_interval_secs: f64,
    /// Whether the live loop scans automatically
    pub auto_scan: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
            auto_scan: true,
        }
    }
}

impl ScannerConfig {
    /// Scan interval as a duration; invalid values fall back to the default
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.scan_interval_secs).unwrap_or_else(|_| {
            warn!(
                "Invalid scan interval {}, using {}s",
                self.scan_interval_secs, DEFAULT_SCAN_INTERVAL_SECS
            );
            Duration::from_secs_f64(DEFAULT_SCAN_INTERVAL_SECS)
        })
    }
}

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// No resolved medicine cached
    Idle,
    /// A resolved medicine is cached
    Resolved,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanState::Idle => write!(f, "idle"),
            ScanState::Resolved => write!(f, "resolved"),
        }
    }
}

/// Result of one scan attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The cache now holds a fresh result
    Resolved,
    /// Nothing accepted; the cache was left as it was
    NoMatch,
}

/// Manual and periodic scan trigger owning the last result
pub struct ScanScheduler {
    pipeline: ResolutionPipeline,
    scan_interval: Duration,
    last_scan_time: Option<Instant>,
    cached: Option<ResolvedMedicine>,
}

impl ScanScheduler {
    pub fn new(pipeline: ResolutionPipeline, scan_interval: Duration) -> Self {
        Self {
            pipeline,
            scan_interval,
            last_scan_time: None,
            cached: None,
        }
    }

    pub fn state(&self) -> ScanState {
        if self.cached.is_some() {
            ScanState::Resolved
        } else {
            ScanState::Idle
        }
    }

    /// Last successfully resolved medicine
    pub fn cached(&self) -> Option<&ResolvedMedicine> {
        self.cached.as_ref()
    }

    /// Start time of the most recent scan attempt
    pub fn last_scan_time(&self) -> Option<Instant> {
        self.last_scan_time
    }

    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    pub fn pipeline(&self) -> &ResolutionPipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut ResolutionPipeline {
        &mut self.pipeline
    }

    /// Scan a frame now
    pub fn manual_scan(&mut self, frame: &CapturedFrame) -> ScanOutcome {
        self.manual_scan_at(frame, Instant::now())
    }

    /// Scan a frame, recording `now` as the attempt time.
    ///
    /// The timestamp is taken before the pipeline runs, so a slow or failed
    /// scan still delays the next automatic one. A miss keeps the cache.
    pub fn manual_scan_at(&mut self, frame: &CapturedFrame, now: Instant) -> ScanOutcome {
        self.last_scan_time = Some(now);

        match self.pipeline.resolve(frame) {
            Some(resolved) => {
                info!("Scan resolved: {}", resolved.name);
                self.cached = Some(resolved);
                ScanOutcome::Resolved
            }
            None => {
                debug!("Scan found no medicine");
                ScanOutcome::NoMatch
            }
        }
    }

    /// Forget the cached result and make the next auto scan eligible
    pub fn reset(&mut self) {
        self.cached = None;
        self.last_scan_time = None;
        info!("Scanner reset");
    }

    /// Whether enough time has passed for an automatic scan
    pub fn is_auto_eligible(&self, now: Instant) -> bool {
        match self.last_scan_time {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.scan_interval,
        }
    }

    /// Scan only if auto-eligible; `None` when skipped
    pub fn auto_scan(&mut self, frame: &CapturedFrame, now: Instant) -> Option<ScanOutcome> {
        if !self.is_auto_eligible(now) {
            return None;
        }
        Some(self.manual_scan_at(frame, now))
    }
}
