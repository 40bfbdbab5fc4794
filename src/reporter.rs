use crate::error::{FatalErrorKind, PageFailure};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

/// Outcome of processing one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub index: usize,
    /// Recognized lines in engine order, after cleanup. Empty for failed pages.
    pub lines: Vec<String>,
    /// Display block: 1-based page label followed by the lines. Empty for failed pages.
    pub text: String,
    pub ok: bool,
    #[serde(default)]
    pub failure: Option<PageFailure>,
}

impl PageResult {
    pub fn success(index: usize, lines: Vec<String>, text: String) -> Self {
        Self {
            index,
            lines,
            text,
            ok: true,
            failure: None,
        }
    }

    pub fn failed(failure: PageFailure) -> Self {
        Self {
            index: failure.index(),
            lines: Vec::new(),
            text: String::new(),
            ok: false,
            failure: Some(failure),
        }
    }
}

/// Sink for run progress and outcomes.
///
/// All callbacks of one run are invoked sequentially, in order, from a single
/// thread. They are notifications: implementations must not panic and must absorb
/// their own failures.
pub trait Reporter {
    fn on_page(&self, page: &PageResult, progress: f64);
    fn on_complete(&self, pages_completed: usize, pages_failed: usize);
    fn on_cancelled(&self, pages_completed: usize);
    fn on_fatal_error(&self, kind: FatalErrorKind);
}

impl<R: Reporter + ?Sized> Reporter for Arc<R> {
    fn on_page(&self, page: &PageResult, progress: f64) {
        (**self).on_page(page, progress)
    }

    fn on_complete(&self, pages_completed: usize, pages_failed: usize) {
        (**self).on_complete(pages_completed, pages_failed)
    }

    fn on_cancelled(&self, pages_completed: usize) {
        (**self).on_cancelled(pages_completed)
    }

    fn on_fatal_error(&self, kind: FatalErrorKind) {
        (**self).on_fatal_error(kind)
    }
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn on_page(&self, page: &PageResult, progress: f64) {
        (**self).on_page(page, progress)
    }

    fn on_complete(&self, pages_completed: usize, pages_failed: usize) {
        (**self).on_complete(pages_completed, pages_failed)
    }

    fn on_cancelled(&self, pages_completed: usize) {
        (**self).on_cancelled(pages_completed)
    }

    fn on_fatal_error(&self, kind: FatalErrorKind) {
        (**self).on_fatal_error(kind)
    }
}

/// Reporter callbacks as values, for handing off to another thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    Page { result: PageResult, progress: f64 },
    Complete { pages_completed: usize, pages_failed: usize },
    Cancelled { pages_completed: usize },
    Fatal { kind: FatalErrorKind },
}

impl PipelineEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineEvent::Page { .. })
    }
}

/// Forwards every callback into an mpsc channel. A dropped receiver is ignored.
pub struct ChannelReporter {
    tx: Mutex<Sender<PipelineEvent>>,
}

impl ChannelReporter {
    pub fn new(tx: Sender<PipelineEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }

    pub fn channel() -> (Self, Receiver<PipelineEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: PipelineEvent) {
        if let Ok(tx) = self.tx.lock() {
            let _ = tx.send(event);
        }
    }
}

impl Reporter for ChannelReporter {
    fn on_page(&self, page: &PageResult, progress: f64) {
        self.send(PipelineEvent::Page {
            result: page.clone(),
            progress,
        });
    }

    fn on_complete(&self, pages_completed: usize, pages_failed: usize) {
        self.send(PipelineEvent::Complete {
            pages_completed,
            pages_failed,
        });
    }

    fn on_cancelled(&self, pages_completed: usize) {
        self.send(PipelineEvent::Cancelled { pages_completed });
    }

    fn on_fatal_error(&self, kind: FatalErrorKind) {
        self.send(PipelineEvent::Fatal { kind });
    }
}
