//! Background model loading.
//!
//! `ModelLoader::spawn` builds a detector on its own thread and installs it into
//! a `DetectorSlot`. The detection loop refuses to start until its slot holds a
//! detector, so callers either wait on the returned `LoadHandle` or poll
//! `DetectorSlot::is_ready`.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};

use super::backend::Detector;
use super::registry::BackendRegistry;
use crate::config::DetectorSettings;

/// Shared cell holding the detector once it is loaded.
///
/// The backend name is tracked separately so readiness checks never wait on an
/// inference call holding the detector lock.
#[derive(Clone, Default)]
pub struct DetectorSlot {
    inner: Arc<SlotInner>,
}

#[derive(Default)]
struct SlotInner {
    detector: Mutex<Option<Box<dyn Detector>>>,
    name: Mutex<Option<&'static str>>,
}

impl DetectorSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, detector: Box<dyn Detector>) {
        let name = detector.name();
        *lock_or_recover(&self.inner.detector) = Some(detector);
        *lock_or_recover(&self.inner.name) = Some(name);
        log::info!("detector '{}' installed", name);
    }

    pub fn is_ready(&self) -> bool {
        lock_or_recover(&self.inner.name).is_some()
    }

    /// Name of the installed backend.
    pub fn backend_name(&self) -> Option<&'static str> {
        *lock_or_recover(&self.inner.name)
    }

    /// Exclusive access to the detector for one inference call.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Option<Box<dyn Detector>>> {
        lock_or_recover(&self.inner.detector)
    }
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Outcome of a background load.
pub struct LoadHandle {
    rx: Receiver<Result<&'static str, String>>,
    thread: Option<JoinHandle<()>>,
}

impl LoadHandle {
    /// Block until the load finishes or `timeout` elapses.
    ///
    /// Returns the backend name on success.
    pub fn wait(mut self, timeout: Duration) -> Result<&'static str> {
        let outcome = match self.rx.recv_timeout(timeout) {
            Ok(Ok(name)) => Ok(name),
            Ok(Err(message)) => Err(anyhow!("model load failed: {}", message)),
            Err(RecvTimeoutError::Timeout) => {
                return Err(anyhow!("model load did not finish within {:?}", timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("model loader thread exited")),
        };
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        outcome
    }

    /// Non-blocking check. `None` while the load is still running.
    pub fn poll(&self) -> Option<Result<&'static str>> {
        match self.rx.try_recv() {
            Ok(Ok(name)) => Some(Ok(name)),
            Ok(Err(message)) => Some(Err(anyhow!("model load failed: {}", message))),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => {
                Some(Err(anyhow!("model loader thread exited")))
            }
        }
    }
}

/// Loads detectors off the caller's thread.
pub struct ModelLoader;

impl ModelLoader {
    /// Build `settings.backend` from `registry`, warm it up, and install it into `slot`.
    pub fn spawn(
        registry: BackendRegistry,
        settings: DetectorSettings,
        slot: DetectorSlot,
    ) -> Result<LoadHandle> {
        Self::spawn_with(slot, move || registry.build(&settings))
    }

    /// Run an arbitrary loader closure in the background.
    pub fn spawn_with<F>(slot: DetectorSlot, load: F) -> Result<LoadHandle>
    where
        F: FnOnce() -> Result<Box<dyn Detector>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let thread = std::thread::Builder::new()
            .name("model-loader".to_string())
            .spawn(move || {
                let outcome = load().and_then(|mut detector| {
                    detector.warm_up()?;
                    Ok(detector)
                });
                let message = match outcome {
                    Ok(detector) => {
                        let name = detector.name();
                        slot.install(detector);
                        Ok(name)
                    }
                    Err(err) => {
                        log::error!("error loading the model: {:#}", err);
                        Err(format!("{:#}", err))
                    }
                };
                let _ = tx.send(message);
            })
            .map_err(|e| anyhow!("failed to spawn model loader: {}", e))?;
        Ok(LoadHandle {
            rx,
            thread: Some(thread),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubBackend;

    #[test]
    fn loader_installs_detector() -> Result<()> {
        let slot = DetectorSlot::new();
        assert!(!slot.is_ready());

        let handle = ModelLoader::spawn(
            BackendRegistry::with_builtin(),
            DetectorSettings::default(),
            slot.clone(),
        )?;
        let name = handle.wait(Duration::from_secs(5))?;

        assert_eq!(name, "stub");
        assert!(slot.is_ready());
        assert_eq!(slot.backend_name(), Some("stub"));
        Ok(())
    }

    #[test]
    fn failed_load_leaves_slot_empty() -> Result<()> {
        let slot = DetectorSlot::new();
        let handle = ModelLoader::spawn_with(slot.clone(), || Err(anyhow!("weights missing")))?;
        let err = handle.wait(Duration::from_secs(5)).unwrap_err();
        assert!(err.to_string().contains("weights missing"));
        assert!(!slot.is_ready());
        Ok(())
    }

    #[test]
    fn poll_reports_completion() -> Result<()> {
        let slot = DetectorSlot::new();
        let handle =
            ModelLoader::spawn_with(slot.clone(), || Ok(Box::new(StubBackend::new()) as Box<dyn Detector>))?;
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(result) = handle.poll() {
                assert_eq!(result?, "stub");
                break;
            }
            assert!(std::time::Instant::now() < deadline, "loader never finished");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(slot.is_ready());
        Ok(())
    }
}
