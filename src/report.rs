use crate::{
    error::FatalErrorKind,
    postprocess,
    reporter::{PageResult, PipelineEvent},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pending,
    Completed,
    Cancelled,
    Fatal(FatalErrorKind),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub input: String,
    pub input_sha256: String,
    pub engine: String,
    pub scale: f64,
    pub started: String,
    pub finished: Option<String>,
    pub outcome: Outcome,
    pub pages_completed: usize,
    pub pages_failed: usize,
    pub last_progress: f64,
    pub page_reports: Vec<PageReport>,
    /// Display blocks of successful pages, in page order.
    #[serde(skip)]
    pub blocks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageReport {
    pub index: usize,
    pub ok: bool,
    pub line_count: usize,
    #[serde(default)]
    pub error: Option<String>,
}

impl PageReport {
    fn from_result(result: &PageResult) -> Self {
        Self {
            index: result.index,
            ok: result.ok,
            line_count: result.lines.len(),
            error: result.failure.as_ref().map(|f| f.to_string()),
        }
    }
}

impl RunReport {
    pub fn new(
        run_id: String,
        input: String,
        input_sha256: String,
        engine: String,
        scale: f64,
    ) -> Self {
        Self {
            run_id,
            input,
            input_sha256,
            engine,
            scale,
            started: crate::util::now_rfc3339(),
            finished: None,
            outcome: Outcome::Pending,
            pages_completed: 0,
            pages_failed: 0,
            last_progress: 0.0,
            page_reports: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Fold one pipeline event into the report.
    pub fn apply(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Page { result, progress } => {
                self.page_reports.push(PageReport::from_result(result));
                self.last_progress = *progress;
                if result.ok {
                    self.blocks.push(result.text.clone());
                }
            }
            PipelineEvent::Complete {
                pages_completed,
                pages_failed,
            } => {
                self.pages_completed = *pages_completed;
                self.pages_failed = *pages_failed;
                self.finish(Outcome::Completed);
            }
            PipelineEvent::Cancelled { .. } => {
                self.pages_completed = self.page_reports.iter().filter(|p| p.ok).count();
                self.pages_failed = self.page_reports.len() - self.pages_completed;
                self.finish(Outcome::Cancelled);
            }
            PipelineEvent::Fatal { kind } => self.finish(Outcome::Fatal(*kind)),
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        self.outcome = outcome;
        self.finished = Some(crate::util::now_rfc3339());
    }

    pub fn is_finished(&self) -> bool {
        self.outcome != Outcome::Pending
    }

    /// Full recognized text accumulated so far.
    pub fn transcript(&self) -> String {
        postprocess::join_pages(&self.blocks)
    }
}
