use thiserror::Error;

/// Errors raised by the detection loop.
///
/// `SourceNotReady` and `InferenceFailure` are recovered inside a tick and only
/// show up in logs and `LoopStats`; callers see `InvalidStartPrecondition` and
/// `WorkerUnavailable`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoopError {
    #[error("frame source not ready")]
    SourceNotReady,

    #[error("inference failed: {0}")]
    InferenceFailure(String),

    #[error("detection loop cannot start before a detector is installed")]
    InvalidStartPrecondition,

    #[error("detection worker unavailable: {0}")]
    WorkerUnavailable(String),
}
