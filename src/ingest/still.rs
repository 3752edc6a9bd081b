//! Still image source (`image://<path>`).
//!
//! Decodes a local image once and serves it at the raw capture rate. Handy
//! for pointing the pipeline at a fixed scene without a camera attached.

use anyhow::{anyhow, Context, Result};
use image::GenericImageView;
use std::path::PathBuf;

use super::{CameraConfig, Pacer, SourceStats};
use crate::frame::RawCapture;

pub struct StillImageSource {
    config: CameraConfig,
    path: PathBuf,
    pacer: Pacer,
    image: Option<(Vec<u8>, u32, u32)>,
    frame_count: u64,
}

impl StillImageSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        let path = config
            .url
            .strip_prefix("image://")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("image source url must be image://<path>"))?;
        let pacer = Pacer::new(config.capture_fps);
        Ok(Self {
            config,
            path,
            pacer,
            image: None,
            frame_count: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.url
    }

    pub fn connect(&mut self) -> Result<()> {
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("read image {}", self.path.display()))?;
        let image = image::load_from_memory(&bytes).context("decode image")?;
        let (width, height) = image.dimensions();
        let rgb = image.into_rgb8();
        log::info!(
            "StillImageSource: loaded {} ({}x{})",
            self.path.display(),
            width,
            height
        );
        self.image = Some((rgb.into_raw(), width, height));
        Ok(())
    }

    pub fn capture(&mut self) -> Result<RawCapture> {
        let (pixels, width, height) = self
            .image
            .as_ref()
            .ok_or_else(|| anyhow!("image source {} is not connected", self.path.display()))?;
        if let Some(max) = self.config.max_frames {
            if self.frame_count >= max {
                return Err(anyhow!("image source exhausted after {} frames", max));
            }
        }
        let capture = RawCapture {
            width: *width,
            height: *height,
            pixels: pixels.clone(),
        };
        self.pacer.wait();
        self.frame_count += 1;
        Ok(capture)
    }

    pub fn is_healthy(&self) -> bool {
        self.image.is_some()
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.config.url.clone(),
        }
    }
}
