use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub render: Render,
    #[serde(default)]
    pub engine: Engine,
    #[serde(default)]
    pub paddle: Paddle,
    #[serde(default)]
    pub tesseract: Tesseract,
    #[serde(default)]
    pub postprocess: Postprocess,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable, normalization-friendly string for hashing.
    pub fn normalized_for_hash(&self) -> String {
        toml::to_string(self).unwrap_or_default()
    }

    /// Resolve a path from the config against `paths.asset_root` unless already absolute.
    pub fn asset_path(&self, rel: &str) -> PathBuf {
        let p = Path::new(rel);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            Path::new(&self.paths.asset_root).join(p)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub print_summary: bool,
    /// Cancel a run that is still going after this many seconds (0 = no limit).
    pub run_timeout_seconds: u64,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
            run_timeout_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub asset_root: String,
    pub scripts_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            asset_root: ".".into(),
            scripts_dir: "scripts".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Render {
    pub scale: f64,
    pub pdftoppm_exe: String,
    pub pdfinfo_exe: String,
    pub timeout_seconds: u64,
}
impl Default for Render {
    fn default() -> Self {
        Self {
            scale: 2.0,
            pdftoppm_exe: "pdftoppm".into(),
            pdfinfo_exe: "pdfinfo".into(),
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    pub backend: String,
    pub lang: String,
    pub page_timeout_seconds: u64,
}
impl Default for Engine {
    fn default() -> Self {
        Self {
            backend: "paddle".into(),
            lang: "ch".into(),
            page_timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paddle {
    pub python_exe: String,
    pub script: String,
    pub use_angle_cls: bool,
    pub det_model_dir: String,
    pub rec_model_dir: String,
    pub cls_model_dir: String,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
}
impl Default for Paddle {
    fn default() -> Self {
        Self {
            python_exe: "auto".into(),
            script: "paddle_ocr.py".into(),
            use_angle_cls: true,
            det_model_dir: "models/det/ch/ch_PP-OCRv4_det_infer".into(),
            rec_model_dir: "models/rec/ch/ch_PP-OCRv4_rec_infer".into(),
            cls_model_dir: "models/cls/ch_ppocr_mobile_v2.0_cls_infer".into(),
            env: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tesseract {
    pub exe: String,
    /// Tesseract language string; empty derives it from `engine.lang`.
    pub lang: String,
    pub psm: u32,
}
impl Default for Tesseract {
    fn default() -> Self {
        Self {
            exe: "tesseract".into(),
            lang: "".into(),
            psm: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Postprocess {
    pub normalize_unicode: bool,
    pub trim_whitespace: bool,
    pub drop_empty_lines: bool,
    pub remove_by_regex: bool,
    #[serde(default)]
    pub regex: PostprocessRegex,
}
impl Default for Postprocess {
    fn default() -> Self {
        Self {
            normalize_unicode: false,
            trim_whitespace: true,
            drop_empty_lines: true,
            remove_by_regex: false,
            regex: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostprocessRegex {
    pub patterns: Vec<String>,
}
impl Default for PostprocessRegex {
    fn default() -> Self {
        Self {
            patterns: vec!["^(page\\s+\\d+|\\d+\\s*/\\s*\\d+)$".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    /// Label placed above each page's text; `{n}` is the 1-based page number.
    pub page_label: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            page_label: "--- Page {n} ---".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub keep_engine_stderr: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            keep_engine_stderr: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Security {
    pub reject_url_inputs: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_inputs: true,
        }
    }
}
