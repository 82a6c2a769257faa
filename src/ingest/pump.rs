use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};

use super::Capture;
use crate::frame::LatestFrame;

/// Consecutive capture errors before the pump tries to reconnect.
const RECONNECT_AFTER_ERRORS: u32 = 5;

/// Background thread copying frames from a `Capture` into a `LatestFrame`.
pub struct CaptureThread {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl CaptureThread {
    /// Connect `capture` and start pumping at `target_fps`.
    ///
    /// Connection errors are returned here; later capture errors are logged and
    /// retried, keeping the last good frame visible.
    pub fn spawn(mut capture: Box<dyn Capture>, target: LatestFrame, target_fps: u32) -> Result<Self> {
        if target_fps == 0 {
            return Err(anyhow!("target fps must be >= 1"));
        }
        capture.connect()?;
        let period = Duration::from_secs_f64(1.0 / target_fps as f64);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || {
                let mut consecutive_errors = 0u32;
                let mut last_health_log = Instant::now();
                loop {
                    let started = Instant::now();
                    match capture.next_frame() {
                        Ok(frame) => {
                            consecutive_errors = 0;
                            target.update(frame);
                        }
                        Err(err) => {
                            consecutive_errors += 1;
                            log::warn!("capture failed ({} in a row): {:#}", consecutive_errors, err);
                            if consecutive_errors >= RECONNECT_AFTER_ERRORS {
                                if let Err(err) = capture.connect() {
                                    log::error!("capture reconnect failed: {:#}", err);
                                }
                                consecutive_errors = 0;
                            }
                        }
                    }

                    if last_health_log.elapsed() >= Duration::from_secs(5) {
                        let stats = capture.stats();
                        log::debug!(
                            "capture health={} frames={} source={}",
                            capture.is_healthy(),
                            stats.frames_captured,
                            stats.source
                        );
                        last_health_log = Instant::now();
                    }

                    let wait = period.saturating_sub(started.elapsed());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| anyhow!("failed to spawn capture thread: {}", e))?;

        Ok(Self {
            stop_tx,
            thread: Some(thread),
        })
    }

    /// Stop pumping and wait for the thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}
