//! PDF page source backed by poppler's `pdfinfo` and `pdftoppm`.

use crate::{
    config::Config,
    document::PageSource,
    error::RasterizeError,
    process::{self, ProcessError},
};
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::debug;

/// Resolution of a page rendered at scale 1.0.
const BASE_DPI: f64 = 72.0;

pub struct PdfDocument {
    path: PathBuf,
    page_count: usize,
    pdftoppm_exe: PathBuf,
    timeout: Option<Duration>,
    work_dir: Option<tempfile::TempDir>,
}

impl PdfDocument {
    pub fn open(cfg: &Config, path: &Path) -> Result<Self> {
        let pdfinfo = PathBuf::from(&cfg.render.pdfinfo_exe);
        let mut cmd = Command::new(&pdfinfo);
        cmd.arg(path);
        let output = process::run_with_input(cmd, b"", timeout_of(cfg.render.timeout_seconds))
            .map_err(|e| match e {
                ProcessError::NotFound(exe) => {
                    anyhow!("{exe} not found (install poppler-utils)")
                }
                other => anyhow!(other),
            })
            .with_context(|| format!("reading page count: {}", path.display()))?;

        let page_count = parse_page_count(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| anyhow!("pdfinfo reported no page count for {}", path.display()))?;

        let work_dir = tempfile::Builder::new()
            .prefix("ocr-render-")
            .tempdir()
            .with_context(|| "creating render work dir")?;

        debug!("opened {} ({} pages)", path.display(), page_count);
        Ok(Self {
            path: path.to_path_buf(),
            page_count,
            pdftoppm_exe: PathBuf::from(&cfg.render.pdftoppm_exe),
            timeout: timeout_of(cfg.render.timeout_seconds),
            work_dir: Some(work_dir),
        })
    }
}

impl PageSource for PdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn rasterize(&mut self, index: usize, scale: f64) -> Result<Vec<u8>, RasterizeError> {
        let work_dir = self
            .work_dir
            .as_ref()
            .ok_or_else(|| RasterizeError::Failed("document closed".into()))?;

        // pdftoppm pages are 1-based
        let page = (index + 1).to_string();
        let prefix = work_dir.path().join(format!("page-{:05}", index + 1));

        let mut cmd = Command::new(&self.pdftoppm_exe);
        cmd.args(["-png", "-singlefile", "-r"])
            .arg(dpi_for_scale(scale).to_string())
            .args(["-f", page.as_str(), "-l", page.as_str()])
            .arg(&self.path)
            .arg(&prefix);

        process::run_with_input(cmd, b"", self.timeout).map_err(|e| match e {
            ProcessError::NotFound(exe) => {
                RasterizeError::ToolMissing(format!("{exe} not found (install poppler-utils)"))
            }
            ProcessError::Io(io) => RasterizeError::Io(io),
            other => RasterizeError::Failed(other.to_string()),
        })?;

        let image_path = prefix.with_extension("png");
        let bytes = std::fs::read(&image_path)?;
        let _ = std::fs::remove_file(&image_path);
        Ok(bytes)
    }

    fn close(&mut self) {
        if let Some(dir) = self.work_dir.take() {
            if let Err(e) = dir.close() {
                debug!("removing render work dir: {e}");
            }
        }
    }
}

fn timeout_of(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

pub fn dpi_for_scale(scale: f64) -> u32 {
    (BASE_DPI * scale).round().max(1.0) as u32
}

fn parse_page_count(pdfinfo: &str) -> Option<usize> {
    pdfinfo.lines().find_map(|line| {
        let rest = line.strip_prefix("Pages:")?;
        rest.trim().parse().ok()
    })
}
