pub mod paddle;
pub mod tesseract;
pub mod types;

use crate::{config::Config, error::RecognizeError};
use anyhow::{anyhow, Result};
use std::sync::Arc;

pub use types::{EngineDiag, HelperInit, RecognizeIn, RecognizeOut, RecognizedLine};

/// Text recognition over a single rendered page image.
///
/// Calls are treated as atomic: the pipeline never interrupts one in flight.
pub trait RecognitionEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the engine can serve requests at all (binaries, scripts, models present).
    fn is_available(&self) -> bool;

    /// What is missing when `is_available` is false.
    fn availability_hint(&self) -> String {
        if self.is_available() {
            format!("{} is available", self.name())
        } else {
            format!("{} is not available", self.name())
        }
    }

    /// Recognize text lines, in reading order, from encoded image bytes.
    fn recognize(&self, image: &[u8]) -> Result<Vec<String>, RecognizeError>;

    fn diag(&self) -> EngineDiag {
        EngineDiag {
            backend: self.name().to_string(),
            available: self.is_available(),
            hint: self.availability_hint(),
            version: None,
        }
    }
}

impl<E: RecognitionEngine + ?Sized> RecognitionEngine for Arc<E> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }

    fn availability_hint(&self) -> String {
        (**self).availability_hint()
    }

    fn recognize(&self, image: &[u8]) -> Result<Vec<String>, RecognizeError> {
        (**self).recognize(image)
    }

    fn diag(&self) -> EngineDiag {
        (**self).diag()
    }
}

/// Build the engine selected by `engine.backend`.
pub fn build(cfg: &Config) -> Result<Arc<dyn RecognitionEngine>> {
    match cfg.engine.backend.as_str() {
        "paddle" => Ok(Arc::new(paddle::PaddleEngine::new(cfg))),
        "tesseract" => Ok(Arc::new(tesseract::TesseractEngine::new(cfg))),
        other => Err(anyhow!("unknown engine.backend: {other}")),
    }
}
