//! Live Detect
//!
//! Runs an object detector against a live camera feed at a fixed cadence and
//! keeps a bounding-box overlay synchronized with the most recent results.
//!
//! # Architecture
//!
//! The loop holds a few guarantees by construction:
//!
//! 1. **One call in flight**: a tick never dispatches while the previous
//!    inference call is still running.
//! 2. **Ordered results**: published batches follow capture order.
//! 3. **Overlay follows the store**: every published batch is rendered, and
//!    each render fully replaces the previous one.
//! 4. **Failures do not stop the schedule**: a failed call yields an empty
//!    batch and the loop keeps ticking.
//!
//! # Module Structure
//!
//! - `frame`: frame handles and the polled `FrameSource` contract
//! - `ingest`: camera captures (synthetic, still image, V4L2) and the capture pump
//! - `detect`: detector backends, registry, async model loading, result types
//! - `detection_loop`: tick scheduler, in-flight guard, inference worker
//! - `store`: latest-result store shared with readers
//! - `overlay`: box and label rendering
//! - `config`: file and environment configuration
//! - `ui`: terminal stage spinners and prediction lists

pub mod config;
pub mod detect;
pub mod detection_loop;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod store;
pub mod ui;

pub use config::{AppConfig, DetectorSettings, LoopSettings, OverlaySettings, SourceSettings};
pub use detect::{
    BackendRegistry, BatchOutcome, BoundingBox, Detection, DetectionBatch, Detector,
    DetectorSlot, LoadHandle, ModelLoader,
};
pub use detection_loop::{
    DetectionLoop, LoopState, LoopStats, SharedRenderer, TickOutcome,
};
pub use error::LoopError;
pub use frame::{Frame, FrameSource, LatestFrame};
pub use ingest::{open_capture, Capture, CaptureStats, CaptureThread};
pub use overlay::{OverlayItem, OverlayRenderer, OverlayStyle, PixelRect};
pub use store::ResultStore;
