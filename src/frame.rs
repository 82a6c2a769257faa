//! Live frame handles.
//!
//! - `Frame`: one sampled instant of the video signal. Pixels are RGB24 and shared
//!   behind an `Arc`, so handing a frame to the inference worker never copies.
//! - `FrameSource`: the polled contract the detection loop reads each tick.
//! - `LatestFrame`: single-slot `FrameSource` that a capture pump overwrites.
//!
//! The detection loop never drives acquisition. It only polls a `FrameSource`.

use std::sync::{Arc, RwLock};
use std::time::Instant;

use anyhow::{anyhow, Result};

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured frame. Pixel bytes are private and never mutated after capture.
#[derive(Clone)]
pub struct Frame {
    pixels: Arc<[u8]>,

    /// Dimensions at capture time.
    pub width: u32,
    pub height: u32,

    /// Capture order, assigned by the capture pump. Starts at 1.
    pub sequence: u64,

    captured_at: Instant,
}

impl Frame {
    /// Wrap RGB24 pixels. The buffer length must match `width * height * 3`.
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        Self::from_shared(pixels.into(), width, height, sequence)
    }

    /// Wrap pixels that are already shared, e.g. a still image replayed as a feed.
    pub fn from_shared(pixels: Arc<[u8]>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = rgb_len(width, height)?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    /// Read-only pixel access for detectors.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGB triple at (x, y), or `None` when out of bounds.
    pub fn rgb_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2]])
    }

    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

pub(crate) fn rgb_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// FrameSource
// ----------------------------------------------------------------------------

/// Contract the detection loop polls once per tick.
///
/// Implementations must be cheap to poll: `current_frame` hands out a handle to
/// the latest frame, it does not block on the camera.
pub trait FrameSource: Send + Sync {
    /// True once the source has a frame with non-zero dimensions.
    fn is_ready(&self) -> bool;

    /// Latest frame, if any.
    fn current_frame(&self) -> Option<Frame>;

    /// Native width of the latest frame (0 when not ready).
    fn width(&self) -> u32;

    /// Native height of the latest frame (0 when not ready).
    fn height(&self) -> u32;
}

/// Single-slot frame holder. Writers replace the frame; readers clone the handle.
#[derive(Clone, Default)]
pub struct LatestFrame {
    slot: Arc<RwLock<Option<Frame>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame.
    pub fn update(&self, frame: Frame) {
        match self.slot.write() {
            Ok(mut guard) => *guard = Some(frame),
            Err(poisoned) => *poisoned.into_inner() = Some(frame),
        }
    }

    /// Drop the held frame (e.g. camera disconnected).
    pub fn clear(&self) {
        match self.slot.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    fn read<T>(&self, f: impl FnOnce(Option<&Frame>) -> T) -> T {
        match self.slot.read() {
            Ok(guard) => f(guard.as_ref()),
            Err(poisoned) => f(poisoned.into_inner().as_ref()),
        }
    }
}

impl FrameSource for LatestFrame {
    fn is_ready(&self) -> bool {
        self.read(|frame| frame.is_some_and(Frame::has_area))
    }

    fn current_frame(&self) -> Option<Frame> {
        self.read(|frame| frame.cloned())
    }

    fn width(&self) -> u32 {
        self.read(|frame| frame.map_or(0, |f| f.width))
    }

    fn height(&self) -> u32 {
        self.read(|frame| frame.map_or(0, |f| f.height))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
