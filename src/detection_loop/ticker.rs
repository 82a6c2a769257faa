use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::Dispatch;
use crate::error::LoopError;

/// Fixed-cadence tick thread. One exists per Running period.
pub(super) struct Ticker {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

impl Ticker {
    pub(super) fn spawn(interval: Duration, dispatch: Arc<Dispatch>) -> Result<Self, LoopError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("detection-ticker".to_string())
            .spawn(move || {
                // Deadlines advance by whole intervals so slow ticks do not drift the schedule.
                let mut next = Instant::now() + interval;
                loop {
                    let wait = next.saturating_duration_since(Instant::now());
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {
                            dispatch.tick();
                            next += interval;
                            let now = Instant::now();
                            if next < now {
                                // Fell more than a full interval behind; skip the missed ticks.
                                next = now + interval;
                            }
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })
            .map_err(|e| LoopError::WorkerUnavailable(format!("failed to spawn ticker: {}", e)))?;
        Ok(Self { stop_tx, thread })
    }

    /// Signal the thread and wait for it. An in-progress tick finishes first.
    pub(super) fn stop(self) {
        let _ = self.stop_tx.send(());
        if self.thread.join().is_err() {
            log::error!("detection ticker panicked");
        }
    }
}
