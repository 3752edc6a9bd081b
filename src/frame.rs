//! Frames and frame sampling.
//!
//! - `RawCapture`: what a frame source hands back on every raw tick.
//! - `Frame`: a sampled capture with an id and timestamp. Owned by exactly one stage at a time.
//! - `FrameSampler`: decimates the raw capture rate down to the processing rate.

use anyhow::{anyhow, Result};
use std::sync::Arc;

use crate::clock::Clock;
use crate::ingest::FrameSource;

// ----------------------------------------------------------------------------
// RawCapture / Frame
// ----------------------------------------------------------------------------

/// Undecorated pixels from a frame source. Not yet sampled, no id.
pub struct RawCapture {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// A sampled frame.
///
/// Pixels are private and there is no `Clone`: a frame moves from stage to
/// stage through channels and is never shared between two workers.
pub struct Frame {
    pub id: u64,
    /// Capture time in seconds since the UNIX epoch.
    pub captured_at: f64,
    pub width: u32,
    pub height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(id: u64, captured_at: f64, width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            id,
            captured_at,
            width,
            height,
            pixels,
        }
    }

    /// A frame with no pixel payload, used when replaying recorded detections.
    pub fn without_pixels(id: u64, captured_at: f64) -> Self {
        Self::new(id, captured_at, 0, 0, Vec::new())
    }

    /// Read-only pixel view for collaborators (detector, vision-language model).
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel bytes are deliberately left out of debug output.
        f.debug_struct("Frame")
            .field("id", &self.id)
            .field("captured_at", &self.captured_at)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// FrameSampler
// ----------------------------------------------------------------------------

/// Counters kept by the sampler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub raw_captures: u64,
    pub sampled: u64,
    pub discarded: u64,
}

/// Wraps a frame source and emits at most one frame per sampling interval.
///
/// Frame ids start at 0 and increase by one per emitted frame. An id is
/// consumed even if the frame is later dropped downstream, so ids are never
/// reused and gaps reveal backpressure.
pub struct FrameSampler {
    source: Box<dyn FrameSource>,
    clock: Arc<dyn Clock>,
    interval_secs: f64,
    last_emit: Option<f64>,
    next_frame_id: u64,
    stats: SamplerStats,
}

impl FrameSampler {
    /// `process_fps` is the target processing rate; the sampling interval is its reciprocal.
    pub fn new(source: Box<dyn FrameSource>, clock: Arc<dyn Clock>, process_fps: f64) -> Result<Self> {
        if !(process_fps.is_finite() && process_fps > 0.0) {
            return Err(anyhow!("process fps must be a positive number"));
        }
        Ok(Self {
            source,
            clock,
            interval_secs: 1.0 / process_fps,
            last_emit: None,
            next_frame_id: 0,
            stats: SamplerStats::default(),
        })
    }

    pub fn interval_secs(&self) -> f64 {
        self.interval_secs
    }

    pub fn stats(&self) -> SamplerStats {
        self.stats
    }

    pub fn source(&self) -> &dyn FrameSource {
        self.source.as_ref()
    }

    pub fn connect(&mut self) -> Result<()> {
        self.source.connect()
    }

    /// Pull one raw capture and decide whether to keep it.
    ///
    /// Returns `Ok(None)` when the capture fell inside the current sampling
    /// interval and was discarded. A source error is returned as-is; the
    /// caller treats it as fatal.
    pub fn tick(&mut self) -> Result<Option<Frame>> {
        let raw = self.source.capture()?;
        self.stats.raw_captures += 1;

        let elapsed = self.clock.monotonic();
        if let Some(last) = self.last_emit {
            if elapsed - last < self.interval_secs {
                self.stats.discarded += 1;
                return Ok(None);
            }
        }

        let id = self.next_frame_id;
        self.next_frame_id += 1;
        self.last_emit = Some(elapsed);
        self.stats.sampled += 1;
        let captured_at = self.clock.now();
        Ok(Some(Frame::new(id, captured_at, raw.width, raw.height, raw.pixels)))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
