mod backend;
pub mod backends;
mod loader;
mod registry;
mod result;

pub use backend::Detector;
pub use backends::{CpuBackend, ScriptProbe, ScriptedBackend, StubBackend};
pub use loader::{DetectorSlot, LoadHandle, ModelLoader};
pub use registry::BackendRegistry;
pub use result::{BatchOutcome, BoundingBox, Detection, DetectionBatch};
