use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDiag {
    pub backend: String,
    pub available: bool,
    pub hint: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// First line sent to the PaddleOCR helper: builds the engine once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelperInit {
    pub lang: String,
    pub use_angle_cls: bool,
    pub det_model_dir: String,
    pub rec_model_dir: String,
    pub cls_model_dir: String,
}

/// One page request, one line per page after the init line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizeIn {
    pub image_path: String,
}

/// Helper reply: the readiness line, the `--check` result, or a page's lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizeOut {
    pub ok: bool,
    #[serde(default)]
    pub lines: Vec<RecognizedLine>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedLine {
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}
