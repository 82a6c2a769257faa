use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::detect::backend::Detector;
use crate::detect::result::Detection;
use crate::frame::Frame;

enum Step {
    Respond(Vec<Detection>),
    Fail(String),
}

/// Backend that replays a fixed script of responses.
///
/// Used by tests that need controllable latency or failures. Once the script
/// is exhausted the last response repeats; an empty script answers with no
/// detections.
pub struct ScriptedBackend {
    script: VecDeque<Step>,
    last: Option<Vec<Detection>>,
    delay: Duration,
    probe: ScriptProbe,
}

/// Shared counters observed from outside the worker thread.
#[derive(Clone, Default)]
pub struct ScriptProbe {
    calls: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    seen_sequences: Arc<std::sync::Mutex<Vec<u64>>>,
}

impl ScriptProbe {
    /// Total `detect` invocations.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `detect` calls observed.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Frame sequences in the order they were handed to the backend.
    pub fn sequences(&self) -> Vec<u64> {
        match self.seen_sequences.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            last: None,
            delay: Duration::ZERO,
            probe: ScriptProbe::default(),
        }
    }

    /// Queue a successful response.
    pub fn respond(mut self, detections: Vec<Detection>) -> Self {
        self.script.push_back(Step::Respond(detections));
        self
    }

    /// Queue a failing response.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.script.push_back(Step::Fail(message.into()));
        self
    }

    /// Sleep this long inside every `detect` call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn probe(&self) -> ScriptProbe {
        self.probe.clone()
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.probe.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.probe.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_active.fetch_max(active, Ordering::SeqCst);
        if let Ok(mut seen) = self.probe.seen_sequences.lock() {
            seen.push(frame.sequence);
        }

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let result = match self.script.pop_front() {
            Some(Step::Respond(detections)) => {
                self.last = Some(detections.clone());
                Ok(detections)
            }
            Some(Step::Fail(message)) => Err(anyhow!(message)),
            None => Ok(self.last.clone().unwrap_or_default()),
        };

        self.probe.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn frame(seq: u64) -> Frame {
        Frame::new(vec![0u8; 12], 2, 2, seq).unwrap()
    }

    #[test]
    fn scripted_backend_replays_then_repeats_last() {
        let person = Detection::new("person", 0.9, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        let mut backend = ScriptedBackend::new()
            .respond(vec![person.clone()])
            .fail("boom");
        let probe = backend.probe();

        assert_eq!(backend.detect(&frame(1)).unwrap(), vec![person.clone()]);
        assert!(backend.detect(&frame(2)).is_err());
        assert_eq!(backend.detect(&frame(3)).unwrap(), vec![person]);

        assert_eq!(probe.calls(), 3);
        assert_eq!(probe.max_concurrent(), 1);
        assert_eq!(probe.sequences(), vec![1, 2, 3]);
    }
}
