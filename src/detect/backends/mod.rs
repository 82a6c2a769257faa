pub mod coco;
pub mod cpu;
pub mod scripted;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use coco::coco_label;
pub use cpu::CpuBackend;
pub use scripted::{ScriptProbe, ScriptedBackend};
pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
