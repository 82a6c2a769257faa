//! Detection scheduler.
//!
//! `DetectionLoop` ticks at a fixed interval while Running. Each tick either
//! dispatches the current frame to the inference worker or skips:
//!
//! - an inference call is still in flight (at most one is ever outstanding),
//! - the frame source has no usable frame yet.
//!
//! The worker runs the detector, tags the batch with the dimensions and
//! sequence of the frame it was *dispatched* with, publishes it to the
//! `ResultStore`, renders it against the source's size at completion time
//! (rescaling the boxes when the camera changed resolution mid-call), and only
//! then releases the in-flight guard. With
//! one call in flight at a time, batches come out in capture order.
//!
//! A failed inference call never stops the loop: it is logged, counted, and
//! replaced by an empty batch. Only `stop()` (or dropping the loop) ends the
//! schedule. `stop()` does not cancel an in-flight call; its result is still
//! published when it lands.

mod ticker;
mod worker;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::LoopSettings;
use crate::detect::{Detector, DetectorSlot};
use crate::error::LoopError;
use crate::frame::{Frame, FrameSource};
use crate::overlay::OverlayRenderer;
use crate::store::ResultStore;

use ticker::Ticker;

/// Renderer handle shared between the worker (sole writer) and read-only consumers.
pub type SharedRenderer = Arc<Mutex<OverlayRenderer>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
}

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Frame with this sequence was handed to the worker.
    Dispatched(u64),
    /// Previous inference still running.
    SkippedBusy,
    /// No usable frame this tick.
    SkippedNotReady,
    /// Loop is Idle; ticks do nothing.
    SkippedIdle,
}

/// Point-in-time counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub ticks: u64,
    pub dispatched: u64,
    pub skipped_busy: u64,
    pub skipped_not_ready: u64,
    pub completed: u64,
    pub failures: u64,
    /// How many times `start()` actually began a schedule.
    pub schedules_started: u64,
    pub last_failure: Option<LoopError>,
}

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    dispatched: AtomicU64,
    skipped_busy: AtomicU64,
    skipped_not_ready: AtomicU64,
    completed: AtomicU64,
    failures: AtomicU64,
    schedules_started: AtomicU64,
}

/// State shared with the inference worker.
struct Shared {
    source: Arc<dyn FrameSource>,
    detector: DetectorSlot,
    renderer: SharedRenderer,
    store: ResultStore,
    in_flight: AtomicBool,
    counters: Counters,
    last_failure: Mutex<Option<LoopError>>,
}

impl Shared {
    fn record_failure(&self, err: LoopError) {
        match self.last_failure.lock() {
            Ok(mut guard) => *guard = Some(err),
            Err(poisoned) => *poisoned.into_inner() = Some(err),
        }
    }

    fn acquire_frame(&self) -> Result<Frame, LoopError> {
        if !self.source.is_ready() {
            return Err(LoopError::SourceNotReady);
        }
        self.source
            .current_frame()
            .filter(Frame::has_area)
            .ok_or(LoopError::SourceNotReady)
    }
}

/// Tick-side handle: the shared state plus the single-slot job channel.
///
/// Kept apart from `Shared` so the worker does not hold a sender to its own
/// queue; dropping the sender here is what ends the worker.
struct Dispatch {
    shared: Arc<Shared>,
    running: AtomicBool,
    jobs: Mutex<Option<SyncSender<Frame>>>,
}

impl Dispatch {
    fn tick(&self) -> TickOutcome {
        let shared = &self.shared;
        if !self.running.load(Ordering::Acquire) {
            return TickOutcome::SkippedIdle;
        }
        shared.counters.ticks.fetch_add(1, Ordering::Relaxed);

        if shared
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            shared.counters.skipped_busy.fetch_add(1, Ordering::Relaxed);
            log::trace!("tick skipped: inference in flight");
            return TickOutcome::SkippedBusy;
        }

        let frame = match shared.acquire_frame() {
            Ok(frame) => frame,
            Err(err) => {
                shared.in_flight.store(false, Ordering::Release);
                shared.counters.skipped_not_ready.fetch_add(1, Ordering::Relaxed);
                log::trace!("tick skipped: {}", err);
                return TickOutcome::SkippedNotReady;
            }
        };
        let sequence = frame.sequence;

        let sent = match self.jobs.lock() {
            Ok(jobs) => jobs.as_ref().map(|tx| tx.try_send(frame)),
            Err(poisoned) => poisoned.into_inner().as_ref().map(|tx| tx.try_send(frame)),
        };
        match sent {
            Some(Ok(())) => {
                shared.counters.dispatched.fetch_add(1, Ordering::Relaxed);
                TickOutcome::Dispatched(sequence)
            }
            Some(Err(TrySendError::Full(_))) => {
                shared.in_flight.store(false, Ordering::Release);
                shared.counters.skipped_busy.fetch_add(1, Ordering::Relaxed);
                TickOutcome::SkippedBusy
            }
            Some(Err(TrySendError::Disconnected(_))) | None => {
                shared.in_flight.store(false, Ordering::Release);
                log::error!("detection worker is gone; tick dropped");
                TickOutcome::SkippedBusy
            }
        }
    }
}

struct Control {
    state: LoopState,
    ticker: Option<Ticker>,
}

/// Shortest tick interval; a zero interval would spin the ticker.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// How long dropping the loop waits for an in-flight call before detaching the worker.
const DROP_GRACE: Duration = Duration::from_secs(5);

/// Periodic detect-and-render scheduler.
pub struct DetectionLoop {
    dispatch: Arc<Dispatch>,
    control: Mutex<Control>,
    worker: Option<JoinHandle<()>>,
    interval: Duration,
}

impl DetectionLoop {
    /// Build an Idle loop. The inference worker is spawned immediately; ticks
    /// start on `start()`. Intervals below `MIN_INTERVAL` are raised to it.
    pub fn new(
        source: Arc<dyn FrameSource>,
        detector: DetectorSlot,
        renderer: SharedRenderer,
        store: ResultStore,
        settings: &LoopSettings,
    ) -> Result<Self, LoopError> {
        let shared = Arc::new(Shared {
            source,
            detector,
            renderer,
            store,
            in_flight: AtomicBool::new(false),
            counters: Counters::default(),
            last_failure: Mutex::new(None),
        });
        let interval = if settings.interval < MIN_INTERVAL {
            log::warn!(
                "detection interval {:?} too short; using {:?}",
                settings.interval,
                MIN_INTERVAL
            );
            MIN_INTERVAL
        } else {
            settings.interval
        };
        let (jobs_tx, jobs_rx) = mpsc::sync_channel::<Frame>(1);
        let worker = worker::spawn(Arc::clone(&shared), jobs_rx)?;
        Ok(Self {
            dispatch: Arc::new(Dispatch {
                shared,
                running: AtomicBool::new(false),
                jobs: Mutex::new(Some(jobs_tx)),
            }),
            control: Mutex::new(Control {
                state: LoopState::Idle,
                ticker: None,
            }),
            worker: Some(worker),
            interval,
        })
    }

    fn control(&self) -> MutexGuard<'_, Control> {
        match self.control.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Idle -> Running. No-op when already Running.
    ///
    /// Fails with `InvalidStartPrecondition` while no detector is installed.
    pub fn start(&self) -> Result<(), LoopError> {
        let mut control = self.control();
        if control.state == LoopState::Running {
            log::debug!("start ignored: detection already running");
            return Ok(());
        }
        if !self.dispatch.shared.detector.is_ready() {
            return Err(LoopError::InvalidStartPrecondition);
        }
        if self.worker.as_ref().map_or(true, JoinHandle::is_finished) {
            return Err(LoopError::WorkerUnavailable(
                "inference worker has exited".to_string(),
            ));
        }

        self.dispatch.running.store(true, Ordering::Release);
        let ticker = match Ticker::spawn(self.interval, Arc::clone(&self.dispatch)) {
            Ok(ticker) => ticker,
            Err(err) => {
                self.dispatch.running.store(false, Ordering::Release);
                return Err(err);
            }
        };
        control.ticker = Some(ticker);
        control.state = LoopState::Running;
        self.dispatch
            .shared
            .counters
            .schedules_started
            .fetch_add(1, Ordering::Relaxed);
        log::info!(
            "detection started: detector={} interval={:?}",
            self.dispatch.shared.detector.backend_name().unwrap_or("?"),
            self.interval
        );
        Ok(())
    }

    /// Running -> Idle. No-op when already Idle. Does not cancel an in-flight call.
    pub fn stop(&self) {
        let mut control = self.control();
        if control.state == LoopState::Idle {
            return;
        }
        self.dispatch.running.store(false, Ordering::Release);
        if let Some(ticker) = control.ticker.take() {
            ticker.stop();
        }
        control.state = LoopState::Idle;
        log::info!("detection stopped");
    }

    /// Start when Idle, stop when Running. Returns the new state.
    pub fn toggle(&self) -> Result<LoopState, LoopError> {
        match self.state() {
            LoopState::Idle => self.start()?,
            LoopState::Running => self.stop(),
        }
        Ok(self.state())
    }

    pub fn state(&self) -> LoopState {
        self.control().state
    }

    pub fn is_running(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// Run one tick now, outside the timer. Does nothing while Idle.
    pub fn tick(&self) -> TickOutcome {
        self.dispatch.tick()
    }

    /// True while an inference call is outstanding.
    pub fn in_flight(&self) -> bool {
        self.dispatch.shared.in_flight.load(Ordering::Acquire)
    }

    /// Wait until no inference call is outstanding. Returns `false` on timeout.
    pub fn wait_settled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight() {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    /// Install (or replace) the detector.
    pub fn install_detector(&self, detector: Box<dyn Detector>) {
        self.dispatch.shared.detector.install(detector);
    }

    pub fn detector_slot(&self) -> DetectorSlot {
        self.dispatch.shared.detector.clone()
    }

    pub fn store(&self) -> &ResultStore {
        &self.dispatch.shared.store
    }

    pub fn renderer(&self) -> SharedRenderer {
        Arc::clone(&self.dispatch.shared.renderer)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn stats(&self) -> LoopStats {
        let shared = &self.dispatch.shared;
        let c = &shared.counters;
        LoopStats {
            ticks: c.ticks.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            skipped_busy: c.skipped_busy.load(Ordering::Relaxed),
            skipped_not_ready: c.skipped_not_ready.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            schedules_started: c.schedules_started.load(Ordering::Relaxed),
            last_failure: match shared.last_failure.lock() {
                Ok(guard) => guard.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            },
        }
    }

    /// Stop, then end the worker. Waits up to `grace` for an in-flight call;
    /// a call still running after that is left to finish on a detached thread.
    ///
    /// Returns `true` when the worker was joined.
    pub fn shutdown(mut self, grace: Duration) -> bool {
        self.finish(grace)
    }

    fn finish(&mut self, grace: Duration) -> bool {
        self.stop();
        // Dropping the last sender ends the worker's receive loop.
        match self.dispatch.jobs.lock() {
            Ok(mut jobs) => drop(jobs.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
        let Some(worker) = self.worker.take() else {
            return true;
        };
        if !self.wait_settled(grace) {
            log::warn!(
                "inference call still running after {:?}; detaching detection worker",
                grace
            );
            return false;
        }
        if worker.join().is_err() {
            log::error!("detection worker panicked");
        }
        true
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.finish(DROP_GRACE);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
