//! Synthetic frame source (`stub://`).
//!
//! Produces a moving gradient with a band of random noise, paced to the raw
//! capture rate. Used by the demo daemon and by tests in place of a camera.

use anyhow::{anyhow, Result};
use rand::RngCore;

use super::{CameraConfig, Pacer, SourceStats};
use crate::frame::RawCapture;

pub struct SyntheticSource {
    config: CameraConfig,
    pacer: Pacer,
    frame_count: u64,
    connected: bool,
    /// Simulated scene state; shifts the gradient every 50 captures.
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(config: CameraConfig) -> Self {
        let pacer = Pacer::new(config.capture_fps);
        Self {
            config,
            pacer,
            frame_count: 0,
            connected: false,
            scene_state: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.url
    }

    /// Synthetic sources are always reachable.
    pub fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: connected to {} ({}x{} @ {}fps)",
            self.config.url,
            self.config.width,
            self.config.height,
            self.config.capture_fps
        );
        self.connected = true;
        Ok(())
    }

    pub fn capture(&mut self) -> Result<RawCapture> {
        if !self.connected {
            return Err(anyhow!("synthetic source {} is not connected", self.config.url));
        }
        if let Some(max) = self.config.max_frames {
            if self.frame_count >= max {
                self.connected = false;
                return Err(anyhow!(
                    "synthetic source {} exhausted after {} frames",
                    self.config.url,
                    max
                ));
            }
        }

        self.pacer.wait();
        self.frame_count += 1;

        Ok(RawCapture {
            width: self.config.width,
            height: self.config.height,
            pixels: self.generate_pixels(),
        })
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.config.width as usize) * (self.config.height as usize) * 3; // RGB

        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }

        // Sensor noise on the last row.
        let row = (self.config.width as usize) * 3;
        if pixel_count >= row {
            rand::thread_rng().fill_bytes(&mut pixels[pixel_count - row..]);
        }
        pixels
    }

    pub fn is_healthy(&self) -> bool {
        self.connected
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
