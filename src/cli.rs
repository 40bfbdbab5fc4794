use crate::{
    config::Config,
    document::PageSource,
    engine,
    pipeline::{PipelineController, RenderConfig},
    process,
    render::PdfDocument,
    report::{Outcome, RunReport},
    reporter::{ChannelReporter, PipelineEvent},
    util::{ensure_dir, hash_file, run_id},
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_CONFIG: &str = "offline-pdf-ocr.toml";
const EXAMPLE_CONFIG: &str = "offline-pdf-ocr.example.toml";

#[derive(Parser, Debug)]
#[command(name = "offline-pdf-ocr")]
#[command(about = "Offline PDF OCR: rasterize pages, recognize text, stream results page by page")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./offline-pdf-ocr.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report engine and rasterizer availability.
    Doctor {},
    /// Print the page count of a PDF.
    Pages {
        #[arg(long)]
        input: PathBuf,
    },
    /// Recognize every page of a PDF, printing page text as it arrives.
    Run {
        #[arg(long)]
        input: PathBuf,
        /// Render scale (1.0 = 72 dpi).
        #[arg(long)]
        scale: Option<f64>,
        /// Recognition language (ch, en, chinese_cht, ...).
        #[arg(long)]
        lang: Option<String>,
        /// Recognition backend (paddle, tesseract).
        #[arg(long)]
        backend: Option<String>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let mut cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    let log_path = resolve_log_path(&cfg);
    let _guard = init_logging(&args, &cfg, log_path.as_deref())?;

    match &args.cmd {
        Command::Doctor {} => doctor(&cfg),
        Command::Pages { input } => pages(&cfg, input),
        Command::Run {
            input,
            scale,
            lang,
            backend,
        } => {
            if let Some(scale) = scale {
                cfg.render.scale = *scale;
            }
            if let Some(lang) = lang {
                cfg.engine.lang = lang.clone();
            }
            if let Some(backend) = backend {
                cfg.engine.backend = backend.clone();
            }
            run(&cfg, input)
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    [DEFAULT_CONFIG, EXAMPLE_CONFIG]
        .into_iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Page text goes to stdout; keep diagnostics on stderr.
    let stderr_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn doctor(cfg: &Config) -> Result<()> {
    let engine = engine::build(cfg)?;
    let diag = engine.diag();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "engine": diag,
            "pdftoppm": process::probe_binary(Path::new(&cfg.render.pdftoppm_exe), "-v"),
            "pdfinfo": process::probe_binary(Path::new(&cfg.render.pdfinfo_exe), "-v"),
            "asset_root": cfg.paths.asset_root,
        }))?
    );
    Ok(())
}

fn pages(cfg: &Config, input: &Path) -> Result<()> {
    validate_input(cfg, input)?;
    let doc = PdfDocument::open(cfg, input)?;
    println!("{}", doc.page_count());
    Ok(())
}

fn run(cfg: &Config, input: &Path) -> Result<()> {
    validate_input(cfg, input)?;

    let render = RenderConfig::from(cfg);
    if !(1.0..=3.0).contains(&render.scale) {
        warn!("scale {} is outside the usual 1.0-3.0 range", render.scale);
    }

    let input_hash =
        hash_file(input).with_context(|| format!("hashing input: {}", input.display()))?;
    let id = run_id(&cfg.normalized_for_hash(), &input_hash);

    let engine = engine::build(cfg)?;
    let controller = PipelineController::new(cfg, engine.clone())?;
    let doc = PdfDocument::open(cfg, input)?;
    let page_count = doc.page_count();
    info!("run_id={id} input={} pages={page_count}", input.display());

    let mut report = RunReport::new(
        id,
        input.display().to_string(),
        input_hash,
        engine.name().to_string(),
        render.scale,
    );

    let (reporter, events) = ChannelReporter::channel();
    let handle = controller.start(doc, render, reporter)?;

    let mut deadline = match cfg.global.run_timeout_seconds {
        0 => None,
        secs => Some(Instant::now() + Duration::from_secs(secs)),
    };

    while !report.is_finished() {
        let wait = match deadline {
            Some(d) => d.saturating_duration_since(Instant::now()),
            None => Duration::from_millis(500),
        };
        match events.recv_timeout(wait) {
            Ok(event) => {
                if let PipelineEvent::Page { result, progress } = &event {
                    if result.ok {
                        println!("{}", result.text);
                    } else if let Some(failure) = &result.failure {
                        warn!("{failure}");
                    }
                    info!(
                        "completed {}/{} pages ({:.0}%)",
                        result.index + 1,
                        page_count,
                        progress * 100.0
                    );
                }
                report.apply(&event);
            }
            Err(RecvTimeoutError::Timeout) => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    warn!(
                        "run exceeded {}s; cancelling",
                        cfg.global.run_timeout_seconds
                    );
                    handle.cancel();
                    deadline = None;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let state = handle.wait()?;
    info!("run finished: {state:?}");

    if cfg.global.print_summary {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    match report.outcome {
        Outcome::Fatal(kind) => Err(anyhow!("{kind}: {}", engine.availability_hint())),
        Outcome::Pending => Err(anyhow!("pipeline ended without a terminal event")),
        Outcome::Completed | Outcome::Cancelled => Ok(()),
    }
}

fn validate_input(cfg: &Config, input: &Path) -> Result<()> {
    let input_str = input.display().to_string();

    if cfg.security.reject_url_inputs && looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are disabled: {input_str}"));
    }

    if !input.exists() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    if let Some(ext) = input.extension().and_then(|s| s.to_str()) {
        if !ext.eq_ignore_ascii_case("pdf") {
            return Err(anyhow!("input is not a PDF: {}", input.display()));
        }
    } else {
        warn!("input has no extension; assuming PDF: {}", input.display());
    }

    Ok(())
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}

fn resolve_log_path(cfg: &Config) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(PathBuf::from("offline-pdf-ocr.log"))
}
