#![allow(dead_code)]

use offline_pdf_ocr::{
    FatalErrorKind, PageResult, PageSource, PipelineEvent, RasterizeError, RecognitionEngine,
    RecognizeError, Reporter,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const RECV_TIMEOUT: Duration = Duration::from_secs(10);

/// In-memory document; page `i` rasterizes to the single byte `i`.
pub struct FakeSource {
    pages: usize,
    fail_rasterize: HashSet<usize>,
    pub closed: Arc<AtomicBool>,
    pub rasterized: Arc<Mutex<Vec<usize>>>,
    open_gate: Option<Receiver<()>>,
    opened: AtomicBool,
}

impl FakeSource {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            fail_rasterize: HashSet::new(),
            closed: Arc::new(AtomicBool::new(false)),
            rasterized: Arc::new(Mutex::new(Vec::new())),
            open_gate: None,
            opened: AtomicBool::new(false),
        }
    }

    pub fn failing_rasterize(mut self, index: usize) -> Self {
        self.fail_rasterize.insert(index);
        self
    }

    /// The first `page_count` call blocks until the returned sender fires or drops.
    pub fn gated_open(mut self) -> (Self, Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.open_gate = Some(rx);
        (self, tx)
    }
}

impl PageSource for FakeSource {
    fn page_count(&self) -> usize {
        if !self.opened.swap(true, Ordering::SeqCst) {
            if let Some(gate) = &self.open_gate {
                let _ = gate.recv_timeout(RECV_TIMEOUT);
            }
        }
        self.pages
    }

    fn rasterize(&mut self, index: usize, _scale: f64) -> Result<Vec<u8>, RasterizeError> {
        assert!(
            !self.closed.load(Ordering::SeqCst),
            "rasterize after close"
        );
        self.rasterized.lock().unwrap().push(index);
        if self.fail_rasterize.contains(&index) {
            return Err(RasterizeError::Failed(format!("corrupt page {index}")));
        }
        Ok(vec![index as u8])
    }

    fn close(&mut self) {
        assert!(!self.closed.swap(true, Ordering::SeqCst), "closed twice");
    }
}

/// Returns two lines per page, built from the page byte.
pub struct FakeEngine {
    available: bool,
    fail_on: HashSet<u8>,
    pub calls: AtomicUsize,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            available: true,
            fail_on: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn failing_on(mut self, index: usize) -> Self {
        self.fail_on.insert(index as u8);
        self
    }
}

impl RecognitionEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn recognize(&self, image: &[u8]) -> Result<Vec<String>, RecognizeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let page = image[0];
        if self.fail_on.contains(&page) {
            return Err(RecognizeError::Failed(format!("engine error on {page}")));
        }
        Ok(vec![format!("  page {page} first  "), format!("page {page} second")])
    }
}

/// Collects every callback in order.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<PipelineEvent>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Reporter for Recorder {
    fn on_page(&self, page: &PageResult, progress: f64) {
        self.push(PipelineEvent::Page {
            result: page.clone(),
            progress,
        });
    }

    fn on_complete(&self, pages_completed: usize, pages_failed: usize) {
        self.push(PipelineEvent::Complete {
            pages_completed,
            pages_failed,
        });
    }

    fn on_cancelled(&self, pages_completed: usize) {
        self.push(PipelineEvent::Cancelled { pages_completed });
    }

    fn on_fatal_error(&self, kind: FatalErrorKind) {
        self.push(PipelineEvent::Fatal { kind });
    }
}

/// Forwards events to the test and blocks inside `on_page` until released.
pub struct GatedReporter {
    events: Mutex<Sender<PipelineEvent>>,
    release: Mutex<Receiver<()>>,
}

pub struct Gate {
    pub events: Receiver<PipelineEvent>,
    release: Sender<()>,
}

impl Gate {
    pub fn next(&self) -> PipelineEvent {
        self.events
            .recv_timeout(RECV_TIMEOUT)
            .expect("pipeline event")
    }

    pub fn release(&self) {
        let _ = self.release.send(());
    }
}

pub fn gated() -> (GatedReporter, Gate) {
    let (event_tx, event_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    (
        GatedReporter {
            events: Mutex::new(event_tx),
            release: Mutex::new(release_rx),
        },
        Gate {
            events: event_rx,
            release: release_tx,
        },
    )
}

impl GatedReporter {
    fn send(&self, event: PipelineEvent) {
        let _ = self.events.lock().unwrap().send(event);
    }
}

impl Reporter for GatedReporter {
    fn on_page(&self, page: &PageResult, progress: f64) {
        self.send(PipelineEvent::Page {
            result: page.clone(),
            progress,
        });
        let _ = self.release.lock().unwrap().recv_timeout(RECV_TIMEOUT);
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

pub fn page_indices(events: &[PipelineEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Page { result, .. } => Some(result.index),
            _ => None,
        })
        .collect()
}

pub fn progress_values(events: &[PipelineEvent]) -> Vec<f64> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Page { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect()
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}
