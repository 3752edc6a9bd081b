//! Frame ingestion sources.
//!
//! This module provides the raw frame sources the sampler pulls from:
//! - Synthetic scene (`stub://...`), paced to the raw capture rate
//! - Still image file (feature: ingest-image), replayed at the raw capture rate
//!
//! All sources produce `RawCapture` values. The ingestion layer is responsible for:
//! - Pacing captures to the configured raw rate (a real camera blocks on its own)
//! - Reporting unrecoverable source failures as errors
//!
//! The ingestion layer MUST NOT:
//! - Assign frame ids or timestamps (the sampler owns both)
//! - Retry or reconnect after a failure

#[cfg(feature = "ingest-image")]
pub mod still;
pub mod synthetic;

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::frame::RawCapture;

#[cfg(feature = "ingest-image")]
pub use still::StillImageSource;
pub use synthetic::SyntheticSource;

/// Raw frame source collaborator.
pub trait FrameSource: Send {
    /// Source identifier for logs.
    fn name(&self) -> &str;

    /// Open the device/stream. Failure is fatal at startup.
    fn connect(&mut self) -> Result<()>;

    /// Block until the next raw capture is available.
    fn capture(&mut self) -> Result<RawCapture>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

/// Configuration for a camera source.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Source URL (e.g., "stub://camera", "image:///tmp/desk.jpg").
    pub url: String,
    pub width: u32,
    pub height: u32,
    /// Raw capture rate the source delivers at.
    pub capture_fps: u32,
    /// Stop with an error after this many captures (synthetic sources only).
    pub max_frames: Option<u64>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 640,
            height: 480,
            capture_fps: 30,
            max_frames: None,
        }
    }
}

/// Camera source selected from the URL scheme.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-image")]
    Still(StillImageSource),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.url.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticSource::new(config)),
            });
        }
        if config.url.starts_with("image://") {
            #[cfg(feature = "ingest-image")]
            {
                return Ok(Self {
                    backend: CameraBackend::Still(StillImageSource::new(config)?),
                });
            }
            #[cfg(not(feature = "ingest-image"))]
            {
                anyhow::bail!("image:// sources require the ingest-image feature")
            }
        }
        anyhow::bail!(
            "unsupported source url '{}'; expected stub:// or image://",
            config.url
        )
    }
}

impl FrameSource for CameraSource {
    fn name(&self) -> &str {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.name(),
            #[cfg(feature = "ingest-image")]
            CameraBackend::Still(source) => source.name(),
        }
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-image")]
            CameraBackend::Still(source) => source.connect(),
        }
    }

    fn capture(&mut self) -> Result<RawCapture> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.capture(),
            #[cfg(feature = "ingest-image")]
            CameraBackend::Still(source) => source.capture(),
        }
    }

    fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.is_healthy(),
            #[cfg(feature = "ingest-image")]
            CameraBackend::Still(source) => source.is_healthy(),
        }
    }

    fn stats(&self) -> SourceStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-image")]
            CameraBackend::Still(source) => source.stats(),
        }
    }
}

/// Sleeps just long enough to hold a fixed capture rate.
pub(crate) struct Pacer {
    interval: Duration,
    next_deadline: Option<Instant>,
}

impl Pacer {
    pub(crate) fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            next_deadline: None,
        }
    }

    pub(crate) fn wait(&mut self) {
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        // Do not accumulate debt when the caller falls behind.
        let base = deadline.max(now);
        self.next_deadline = Some(base + self.interval);
    }
}
