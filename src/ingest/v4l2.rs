//! V4L2 frame source.
//!
//! `V4l2Capture` reads from a local device node (e.g. /dev/video0). RGB3 is
//! requested first; drivers that answer with NV12 or YUYV are converted.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture as _;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::{Capture, CaptureStats};
use crate::config::SourceSettings;
use crate::frame::Frame;

const MMAP_BUFFERS: u32 = 4;
/// Frames missed before the device counts as stalled.
const STALL_FRAMES: u32 = 6;
const MIN_STALL: Duration = Duration::from_secs(2);

#[self_referencing]
struct OpenDevice {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

/// Geometry and layout the driver agreed to.
#[derive(Clone, Copy, Debug)]
struct Negotiated {
    width: u32,
    height: u32,
    format: PixelFormat,
}

pub struct V4l2Capture {
    settings: SourceSettings,
    open: Option<OpenDevice>,
    negotiated: Option<Negotiated>,
    frames: u64,
    last_frame_at: Option<Instant>,
    failed: bool,
}

impl V4l2Capture {
    pub fn new(settings: SourceSettings) -> Self {
        Self {
            settings,
            open: None,
            negotiated: None,
            frames: 0,
            last_frame_at: None,
            failed: false,
        }
    }

    fn stall_after(&self) -> Duration {
        let per_frame = Duration::from_secs(1) / self.settings.target_fps.max(1);
        (per_frame * STALL_FRAMES).max(MIN_STALL)
    }
}

/// Ask for the configured size in RGB3 and report what the driver settled on.
fn negotiate(device: &mut v4l::Device, settings: &SourceSettings) -> Result<Negotiated> {
    let mut wanted = device.format().context("read v4l2 format")?;
    wanted.width = settings.width;
    wanted.height = settings.height;
    wanted.fourcc = v4l::FourCC::new(b"RGB3");

    let agreed = device.set_format(&wanted).or_else(|err| {
        log::warn!(
            "V4l2Capture: {} refused {}x{} RGB3 ({}); keeping driver format",
            settings.url,
            settings.width,
            settings.height,
            err
        );
        device.format().context("read v4l2 format after refusal")
    })?;
    let format = PixelFormat::from_fourcc(&agreed.fourcc.repr)
        .ok_or_else(|| anyhow!("unsupported v4l2 pixel format {}", agreed.fourcc))?;

    let params = v4l::video::capture::Parameters::with_fps(settings.target_fps);
    if let Err(err) = device.set_params(&params) {
        log::warn!("V4l2Capture: {} ignored {} fps: {}", settings.url, settings.target_fps, err);
    }

    Ok(Negotiated {
        width: agreed.width,
        height: agreed.height,
        format,
    })
}

impl Capture for V4l2Capture {
    fn connect(&mut self) -> Result<()> {
        self.open = None;
        self.failed = true;

        let mut device = v4l::Device::with_path(&self.settings.url)
            .with_context(|| format!("open v4l2 device {}", self.settings.url))?;
        let negotiated = negotiate(&mut device, &self.settings)?;
        let open = OpenDeviceTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, MMAP_BUFFERS)
                    .context("map v4l2 capture buffers")
            },
        }
        .try_build()?;

        log::info!(
            "V4l2Capture: streaming {} at {}x{} {:?}",
            self.settings.url,
            negotiated.width,
            negotiated.height,
            negotiated.format
        );
        self.open = Some(open);
        self.negotiated = Some(negotiated);
        self.failed = false;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        let (Some(open), Some(negotiated)) = (self.open.as_mut(), self.negotiated) else {
            return Err(anyhow!("v4l2 device {} not connected", self.settings.url));
        };
        let raw = match open.with_stream_mut(|stream| stream.next().map(|(buf, _)| buf.to_vec())) {
            Ok(raw) => raw,
            Err(err) => {
                self.failed = true;
                return Err(anyhow::Error::new(err).context("dequeue v4l2 buffer"));
            }
        };

        let rgb = normalize_to_rgb(&raw, negotiated.width, negotiated.height, negotiated.format)?;
        self.frames += 1;
        self.last_frame_at = Some(Instant::now());
        self.failed = false;
        Frame::new(rgb, negotiated.width, negotiated.height, self.frames)
    }

    fn is_healthy(&self) -> bool {
        if self.failed || self.open.is_none() {
            return false;
        }
        self.last_frame_at
            .map_or(true, |at| at.elapsed() <= self.stall_after())
    }

    fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_captured: self.frames,
            source: self.settings.url.clone(),
        }
    }
}
