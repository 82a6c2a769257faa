//! Still image frame source.
//!
//! Decodes a local image once on `connect` and replays it as a live feed.
//! Useful for checking a backend against a known picture. The source
//! MUST NOT fetch remote URLs.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};

use super::{Capture, CaptureStats};
use crate::frame::Frame;

pub struct StillCapture {
    path: String,
    image: Option<(Arc<[u8]>, u32, u32)>,
    frame_count: u64,
}

impl StillCapture {
    pub fn new(path: &str) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "still image source only supports local paths (no URL schemes)"
            ));
        }
        Ok(Self {
            path: path.to_string(),
            image: None,
            frame_count: 0,
        })
    }
}

impl Capture for StillCapture {
    fn connect(&mut self) -> Result<()> {
        let rgb = image::open(&self.path)
            .with_context(|| format!("failed to decode image {}", self.path))?
            .into_rgb8();
        let (width, height) = rgb.dimensions();
        log::info!("StillCapture: loaded {} ({}x{})", self.path, width, height);
        self.image = Some((rgb.into_raw().into(), width, height));
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let (pixels, width, height) = self
            .image
            .as_ref()
            .ok_or_else(|| anyhow!("still image {} not loaded", self.path))?;
        self.frame_count += 1;
        Frame::from_shared(Arc::clone(pixels), *width, *height, self.frame_count)
    }

    fn is_healthy(&self) -> bool {
        self.image.is_some()
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            source: self.path.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    !path.contains("://")
}
