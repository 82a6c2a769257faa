use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::JoinHandle;

use super::Shared;
use crate::detect::{Detection, DetectionBatch};
use crate::error::LoopError;
use crate::frame::Frame;

/// Spawn the inference worker. It exits once every job sender is dropped.
pub(super) fn spawn(shared: Arc<Shared>, jobs: Receiver<Frame>) -> Result<JoinHandle<()>, LoopError> {
    std::thread::Builder::new()
        .name("detection-worker".to_string())
        .spawn(move || {
            for frame in jobs {
                shared.complete(frame);
            }
            log::debug!("detection worker exiting");
        })
        .map_err(|e| LoopError::WorkerUnavailable(format!("failed to spawn worker: {}", e)))
}

impl Shared {
    /// Run inference for one dispatched frame, publish, render at the live video
    /// size, release the guard.
    fn complete(&self, frame: Frame) {
        let (width, height, sequence) = (frame.width, frame.height, frame.sequence);

        let batch = match self.infer(&frame) {
            Ok(detections) => DetectionBatch::new(detections, width, height, sequence),
            Err(err) => {
                log::warn!("frame {}: {}; publishing empty batch", sequence, err);
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                self.record_failure(err);
                DetectionBatch::failed(width, height, sequence)
            }
        };
        drop(frame);

        let batch = Arc::new(batch);
        self.store.publish_shared(Arc::clone(&batch));
        let (target_w, target_h) = self.render_target(width, height);
        match self.renderer.lock() {
            Ok(mut renderer) => renderer.render(&batch, target_w, target_h),
            Err(poisoned) => poisoned.into_inner().render(&batch, target_w, target_h),
        }
        log::trace!(
            "frame {} -> {} detection(s) computed at {}x{}, drawn at {}x{}",
            sequence,
            batch.len(),
            width,
            height,
            target_w,
            target_h
        );

        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        self.in_flight.store(false, Ordering::Release);
    }

    /// Live video size at completion; the inferred frame's size when the source has none.
    fn render_target(&self, frame_width: u32, frame_height: u32) -> (u32, u32) {
        let (live_w, live_h) = (self.source.width(), self.source.height());
        if live_w == 0 || live_h == 0 {
            (frame_width, frame_height)
        } else {
            (live_w, live_h)
        }
    }

    fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, LoopError> {
        let mut slot = self.detector.lock();
        let detector = slot
            .as_mut()
            .ok_or_else(|| LoopError::InferenceFailure("no detector installed".to_string()))?;
        match catch_unwind(AssertUnwindSafe(|| detector.detect(frame))) {
            Ok(Ok(detections)) => Ok(detections),
            Ok(Err(err)) => Err(LoopError::InferenceFailure(format!("{:#}", err))),
            Err(_) => Err(LoopError::InferenceFailure(format!(
                "detector '{}' panicked",
                detector.name()
            ))),
        }
    }
}
