use anyhow::Result;

use crate::detect::backend::Detector;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Stub backend for wiring checks. Never reports anything.
#[derive(Default)]
pub struct StubBackend {
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Detector for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        Ok(Vec::new())
    }
}
