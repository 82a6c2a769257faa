//! Camera acquisition.
//!
//! A `Capture` is a pull-based camera collaborator: `next_frame` blocks until
//! the device has a frame. `CaptureThread` pumps a capture into a `LatestFrame`
//! at the configured rate, which is what the detection loop polls.
//!
//! Sources:
//! - `stub://<name>` synthetic moving pattern (tests, demos)
//! - local still image files (decoded once, replayed as a live feed)
//! - USB/V4L2 devices (feature: ingest-v4l2)

#[cfg(feature = "ingest-v4l2")]
mod normalize;
mod pump;
pub mod still;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;

use crate::config::SourceSettings;
use crate::frame::Frame;

pub use pump::CaptureThread;
pub use still::StillCapture;
pub use synthetic::SyntheticCapture;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Capture;

/// Pull-based frame producer.
pub trait Capture: Send {
    /// Open the underlying device or file.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame. Sequence numbers increase by one per frame.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    /// Get frame statistics.
    fn stats(&self) -> CaptureStats;
}

/// Statistics for a capture source.
#[derive(Clone, Debug)]
pub struct CaptureStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Pick a capture implementation for `settings.url`.
pub fn open_capture(settings: &SourceSettings) -> Result<Box<dyn Capture>> {
    let url = settings.url.trim();
    if url.starts_with("stub://") {
        return Ok(Box::new(SyntheticCapture::new(settings.clone())));
    }
    if url.starts_with("/dev/video") {
        #[cfg(feature = "ingest-v4l2")]
        {
            return Ok(Box::new(V4l2Capture::new(settings.clone())));
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            anyhow::bail!("{} requires the ingest-v4l2 feature", url);
        }
    }
    Ok(Box::new(StillCapture::new(url)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(url: &str) -> SourceSettings {
        SourceSettings {
            url: url.to_string(),
            target_fps: 10,
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn stub_urls_open_synthetic_capture() -> Result<()> {
        let mut capture = open_capture(&settings("stub://front"))?;
        capture.connect()?;
        let frame = capture.next_frame()?;
        assert_eq!((frame.width, frame.height), (64, 48));
        assert_eq!(capture.stats().source, "stub://front");
        Ok(())
    }

    #[test]
    fn remote_urls_are_rejected() {
        assert!(open_capture(&settings("rtsp://camera/stream")).is_err());
    }
}
