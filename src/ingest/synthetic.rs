//! Synthetic frame source for `stub://` URLs.
//!
//! Produces a dim gradient background with a bright square sweeping across it,
//! so motion-based backends have something to find. The background carries a
//! little sensor noise so consecutive frames are never byte-identical.

use anyhow::Result;
use rand::Rng;

use super::{Capture, CaptureStats};
use crate::config::SourceSettings;
use crate::frame::Frame;

/// Side of the moving square, in pixels.
const SQUARE: u32 = 48;
/// Horizontal distance the square moves per frame.
const STEP: u32 = 8;
/// Peak background noise, in intensity levels.
const NOISE: i16 = 3;

pub struct SyntheticCapture {
    settings: SourceSettings,
    frame_count: u64,
    connected: bool,
}

impl SyntheticCapture {
    pub fn new(settings: SourceSettings) -> Self {
        Self {
            settings,
            frame_count: 0,
            connected: false,
        }
    }

    /// Top-left corner of the square in the frame about to be generated.
    fn square_origin(&self) -> (u32, u32) {
        let (w, h) = (self.settings.width, self.settings.height);
        let travel = w.saturating_sub(SQUARE).max(1);
        let x = ((self.frame_count * STEP as u64) % travel as u64) as u32;
        let y = h.saturating_sub(SQUARE) / 2;
        (x, y)
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let (w, h) = (self.settings.width, self.settings.height);
        let (sx, sy) = self.square_origin();
        let mut rng = rand::thread_rng();
        let mut pixels = vec![0u8; (w as usize) * (h as usize) * 3];
        for y in 0..h {
            for x in 0..w {
                let idx = ((y * w + x) * 3) as usize;
                let inside = x >= sx && x < sx + SQUARE && y >= sy && y < sy + SQUARE;
                let rgb = if inside {
                    [240, 240, 240]
                } else {
                    let base = ((x + y) % 64) as i16 + 16;
                    let shade = (base + rng.gen_range(-NOISE..=NOISE)).clamp(0, 255) as u8;
                    [shade, shade, shade]
                };
                pixels[idx..idx + 3].copy_from_slice(&rgb);
            }
        }
        pixels
    }
}

impl Capture for SyntheticCapture {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticCapture: connected to {} ({}x{})",
            self.settings.url,
            self.settings.width,
            self.settings.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let pixels = self.generate_pixels();
        self.frame_count += 1;
        Frame::new(
            pixels,
            self.settings.width,
            self.settings.height,
            self.frame_count,
        )
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frame_count,
            source: self.settings.url.clone(),
        }
    }
}
