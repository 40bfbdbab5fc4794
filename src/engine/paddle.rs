use super::{types::*, RecognitionEngine};
use crate::{
    config::Config,
    error::RecognizeError,
    process::{self, LineSession, ProcessError},
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Model weights file every PaddleOCR inference directory must contain.
const MODEL_PARAMS_FILE: &str = "inference.pdiparams";

/// PaddleOCR driven through a long-lived Python helper (`--serve`).
///
/// The helper builds the models once and answers one page per line. It is
/// started on the first page and restarted after a timeout or crash.
pub struct PaddleEngine {
    cfg: Config,
    script: PathBuf,
    python_exe: PathBuf,
    det_model_dir: PathBuf,
    rec_model_dir: PathBuf,
    cls_model_dir: PathBuf,
    /// `None` when available, else what is missing. Computed once.
    missing: OnceLock<Option<String>>,
    session: Mutex<Option<LineSession>>,
}

impl PaddleEngine {
    pub fn new(cfg: &Config) -> Self {
        let script = PathBuf::from(&cfg.paths.scripts_dir).join(&cfg.paddle.script);
        Self {
            cfg: cfg.clone(),
            script,
            python_exe: resolve_python_exe(&cfg.paddle.python_exe),
            det_model_dir: cfg.asset_path(&cfg.paddle.det_model_dir),
            rec_model_dir: cfg.asset_path(&cfg.paddle.rec_model_dir),
            cls_model_dir: cfg.asset_path(&cfg.paddle.cls_model_dir),
            missing: OnceLock::new(),
            session: Mutex::new(None),
        }
    }

    fn model_dirs(&self) -> [(&'static str, &Path); 3] {
        [
            ("detection", self.det_model_dir.as_path()),
            ("recognition", self.rec_model_dir.as_path()),
            ("orientation", self.cls_model_dir.as_path()),
        ]
    }

    fn missing_requirement(&self) -> Option<&str> {
        self.missing
            .get_or_init(|| self.missing_files().or_else(|| self.check_helper()))
            .as_deref()
    }

    fn missing_files(&self) -> Option<String> {
        if !self.script.exists() {
            return Some(format!("missing script: {}", self.script.display()));
        }
        for (kind, dir) in self.model_dirs() {
            if !dir.join(MODEL_PARAMS_FILE).exists() {
                return Some(format!("{kind} model not found: {}", dir.display()));
            }
        }
        if !process::probe_binary(&self.python_exe, "--version") {
            return Some(format!(
                "python interpreter not runnable: {}",
                self.python_exe.display()
            ));
        }
        None
    }

    /// Have the helper import paddleocr and build the engine, then exit.
    fn check_helper(&self) -> Option<String> {
        let setup = match self.setup_line() {
            Ok(line) => line,
            Err(e) => return Some(e.to_string()),
        };
        let cmd = self.helper_command("--check");
        let output = match process::run_with_input(cmd, setup.as_bytes(), self.timeout()) {
            Ok(output) => output,
            Err(e) => return Some(format!("paddle helper check failed: {e}")),
        };
        match parse_reply(&String::from_utf8_lossy(&output.stdout)) {
            Ok(reply) if reply.ok => None,
            Ok(reply) => Some(format!(
                "paddleocr cannot start: {}",
                reply.error.unwrap_or_else(|| "no reason given".to_string())
            )),
            Err(e) => Some(format!("paddle helper check failed: {e}")),
        }
    }

    fn helper_command(&self, mode: &str) -> Command {
        let mut cmd = Command::new(&self.python_exe);
        cmd.arg(&self.script).arg(mode);
        for (k, v) in &self.cfg.paddle.env {
            cmd.env(k, v);
        }
        cmd
    }

    fn setup_line(&self) -> Result<String, RecognizeError> {
        let setup = HelperInit {
            lang: self.cfg.engine.lang.clone(),
            use_angle_cls: self.cfg.paddle.use_angle_cls,
            det_model_dir: self.det_model_dir.display().to_string(),
            rec_model_dir: self.rec_model_dir.display().to_string(),
            cls_model_dir: self.cls_model_dir.display().to_string(),
        };
        let mut line = serde_json::to_string(&setup)
            .map_err(|e| RecognizeError::Failed(format!("encoding setup: {e}")))?;
        line.push('\n');
        Ok(line)
    }

    fn timeout(&self) -> Option<Duration> {
        match self.cfg.engine.page_timeout_seconds {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    fn start_session(&self) -> Result<LineSession, RecognizeError> {
        let cmd = self.helper_command("--serve");
        let mut session =
            LineSession::spawn(cmd, self.cfg.debug.keep_engine_stderr).map_err(recognize_error)?;
        let setup = self.setup_line()?;
        let ready = session
            .request(setup.trim_end(), self.timeout())
            .map_err(recognize_error)?;
        let ready = parse_reply(&ready)?;
        if !ready.ok {
            return Err(RecognizeError::Unavailable(
                ready
                    .error
                    .unwrap_or_else(|| "paddle helper failed to start".to_string()),
            ));
        }
        info!("paddle helper ready");
        Ok(session)
    }

    fn request_page(&self, image_path: &Path) -> Result<RecognizeOut, RecognizeError> {
        let req = RecognizeIn {
            image_path: image_path.display().to_string(),
        };
        let line = serde_json::to_string(&req)
            .map_err(|e| RecognizeError::Failed(format!("encoding request: {e}")))?;

        let mut slot = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let mut session = match slot.take() {
            Some(session) => session,
            None => self.start_session()?,
        };
        match session.request(&line, self.timeout()) {
            Ok(reply) => {
                *slot = Some(session);
                parse_reply(&reply)
            }
            Err(e) => {
                // Dropping the session kills the helper; the next page starts a new one.
                warn!("paddle helper discarded: {e}");
                Err(recognize_error(e))
            }
        }
    }
}

impl RecognitionEngine for PaddleEngine {
    fn name(&self) -> &str {
        "paddle"
    }

    fn is_available(&self) -> bool {
        match self.missing_requirement() {
            Some(reason) => {
                warn!("paddle engine unavailable: {reason}");
                false
            }
            None => true,
        }
    }

    fn availability_hint(&self) -> String {
        self.missing_requirement()
            .unwrap_or("paddle is available")
            .to_string()
    }

    fn recognize(&self, image: &[u8]) -> Result<Vec<String>, RecognizeError> {
        let mut file = tempfile::Builder::new()
            .prefix("ocr-page-")
            .suffix(".png")
            .tempfile()?;
        file.write_all(image)?;
        file.flush()?;

        let out = self.request_page(file.path())?;
        if !out.ok {
            let msg = out
                .error
                .unwrap_or_else(|| "paddle helper returned ok=false".to_string());
            return Err(RecognizeError::Failed(msg));
        }
        debug!("paddle: {} lines", out.lines.len());
        Ok(out.lines.into_iter().map(|l| l.text).collect())
    }
}

fn parse_reply(line: &str) -> Result<RecognizeOut, RecognizeError> {
    serde_json::from_str(line.trim())
        .map_err(|e| RecognizeError::Failed(format!("parsing helper JSON output: {e}")))
}

fn recognize_error(e: ProcessError) -> RecognizeError {
    match e {
        ProcessError::NotFound(exe) => RecognizeError::Unavailable(exe),
        ProcessError::Timeout { timeout, .. } => RecognizeError::Timeout(timeout.as_secs()),
        ProcessError::Io(io) => RecognizeError::Io(io),
        other => RecognizeError::Failed(other.to_string()),
    }
}

fn resolve_python_exe(raw: &str) -> PathBuf {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("auto") {
        if let Ok(env_val) = std::env::var("OCR_PYTHON") {
            let p = expand_tilde(&env_val);
            if p.exists() {
                return p;
            }
        }
        return PathBuf::from("python3");
    }
    expand_tilde(raw)
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
