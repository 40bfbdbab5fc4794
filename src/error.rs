use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Contract errors returned synchronously by the controller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a run is already in progress")]
    AlreadyRunning,

    #[error("invalid render scale: {0} (must be finite and > 0)")]
    InvalidScale(f64),

    #[error("failed to spawn pipeline worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("pipeline worker panicked")]
    WorkerPanicked,
}

#[derive(Debug, Error)]
pub enum RasterizeError {
    #[error("page {index} out of range (document has {page_count} pages)")]
    OutOfRange { index: usize, page_count: usize },

    #[error("rasterizer not available: {0}")]
    ToolMissing(String),

    #[error("rasterize failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RecognizeError {
    #[error("recognition engine not available: {0}")]
    Unavailable(String),

    #[error("recognition failed: {0}")]
    Failed(String),

    #[error("recognition timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run-aborting conditions, detected before the page loop starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum FatalErrorKind {
    #[error("recognition engine unavailable")]
    EngineUnavailable,
}

/// Page-local failure attached to a `PageResult` with `ok: false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum PageFailure {
    #[error("page {index}: rasterize failed: {reason}")]
    RasterizeFailed { index: usize, reason: String },

    #[error("page {index}: recognize failed: {reason}")]
    RecognizeFailed { index: usize, reason: String },
}

impl PageFailure {
    pub fn index(&self) -> usize {
        match self {
            PageFailure::RasterizeFailed { index, .. } => *index,
            PageFailure::RecognizeFailed { index, .. } => *index,
        }
    }
}
