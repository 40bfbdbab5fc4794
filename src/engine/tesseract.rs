use super::RecognitionEngine;
use crate::{
    config::Config,
    error::RecognizeError,
    process::{self, ProcessError},
};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

/// Tesseract via its command-line binary; the image is piped on stdin.
pub struct TesseractEngine {
    exe: PathBuf,
    lang: String,
    psm: u32,
    timeout: Option<Duration>,
}

impl TesseractEngine {
    pub fn new(cfg: &Config) -> Self {
        let lang = if cfg.tesseract.lang.trim().is_empty() {
            tesseract_lang(&cfg.engine.lang).to_string()
        } else {
            cfg.tesseract.lang.clone()
        };
        Self {
            exe: PathBuf::from(&cfg.tesseract.exe),
            lang,
            psm: cfg.tesseract.psm,
            timeout: match cfg.engine.page_timeout_seconds {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
        }
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }
}

impl RecognitionEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        process::probe_binary(&self.exe, "--version")
    }

    fn availability_hint(&self) -> String {
        if self.is_available() {
            "tesseract is available".to_string()
        } else {
            format!(
                "{} not runnable. Install with: apt install tesseract-ocr",
                self.exe.display()
            )
        }
    }

    fn recognize(&self, image: &[u8]) -> Result<Vec<String>, RecognizeError> {
        let mut cmd = Command::new(&self.exe);
        cmd.args(["stdin", "stdout", "-l", self.lang.as_str(), "--psm"])
            .arg(self.psm.to_string());

        let output = process::run_with_input(cmd, image, self.timeout).map_err(|e| match e {
            ProcessError::NotFound(exe) => RecognizeError::Unavailable(exe),
            ProcessError::Timeout { timeout, .. } => RecognizeError::Timeout(timeout.as_secs()),
            ProcessError::Io(io) => RecognizeError::Io(io),
            other => RecognizeError::Failed(other.to_string()),
        })?;

        Ok(split_lines(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Map the pipeline's language code onto tesseract traineddata names.
fn tesseract_lang(lang: &str) -> &'static str {
    match lang {
        "ch" => "chi_sim+eng",
        "chinese_cht" => "chi_tra+eng",
        "japan" => "jpn+eng",
        "korean" => "kor+eng",
        _ => "eng",
    }
}

fn split_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(|l| l.trim_end_matches('\u{c}'))
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}
