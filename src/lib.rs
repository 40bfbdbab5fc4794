pub mod cli;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod postprocess;
pub mod process;
pub mod render;
pub mod report;
pub mod reporter;
pub mod util;

pub use document::{Document, PageSource};
pub use engine::RecognitionEngine;
pub use error::{FatalErrorKind, PageFailure, PipelineError, RasterizeError, RecognizeError};
pub use pipeline::{Completion, PipelineController, RenderConfig, RunHandle, RunState};
pub use reporter::{ChannelReporter, PageResult, PipelineEvent, Reporter};
