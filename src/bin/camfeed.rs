//! camfeed - capture frames from a remote camera service
//!
//! Authenticates, lists cameras, then streams one camera into the selected
//! sinks until the record length elapses, the stream ends, the display
//! window is closed or Ctrl-C is pressed. A second Ctrl-C exits immediately.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camfeed::config::CaptureConfig;
use camfeed::detect::BackendRegistry;
use camfeed::sink::SinkKind;
use camfeed::ui::{Ui, UiMode};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Camera id to stream (prompted when omitted).
    #[arg(short = 'c', long, env = "CAMFEED_CAMERA_ID")]
    camera_id: Option<String>,
    /// Record length in seconds (prompted when omitted).
    #[arg(short = 't', long)]
    record_length: Option<f64>,
    /// Write per-frame arrival intervals next to the video.
    #[arg(short = 'l', long)]
    log_frametimes: bool,
    /// Sinks to feed; repeat or comma-separate.
    #[arg(long = "sink", value_delimiter = ',')]
    sinks: Vec<String>,
    /// Detector backend for the inference sink.
    #[arg(long)]
    detector: Option<String>,
    /// ONNX model for the tract detector.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Directory for recordings and frametime logs.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Progress output style.
    #[arg(long, value_enum, default_value_t = UiMode::Auto)]
    ui: UiMode,
    /// List detector backends compiled into this build and exit.
    #[arg(long)]
    list_detectors: bool,
}

fn apply_args(cfg: &mut CaptureConfig, args: &Args) -> Result<()> {
    if let Some(id) = &args.camera_id {
        cfg.camera_id = Some(id.trim().to_string());
    }
    if let Some(secs) = args.record_length {
        cfg.record_length = Some(
            Duration::try_from_secs_f64(secs).context("--record-length must be a positive number")?,
        );
    }
    if args.log_frametimes {
        cfg.log_frametimes = true;
    }
    if !args.sinks.is_empty() {
        cfg.sinks = args
            .sinks
            .iter()
            .map(|name| name.parse::<SinkKind>().map_err(anyhow::Error::msg))
            .collect::<Result<Vec<_>>>()?;
    }
    if let Some(detector) = &args.detector {
        cfg.detector = detector.clone();
    }
    if let Some(model) = &args.model {
        cfg.detector_settings.model_path = Some(model.clone());
    }
    if let Some(dir) = &args.output_dir {
        cfg.output_dir = dir.clone();
    }
    cfg.validate()
}

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list_detectors {
        for name in BackendRegistry::with_builtin().list() {
            println!("{}", name);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut cfg = CaptureConfig::load()?;
    apply_args(&mut cfg, &args)?;
    log::debug!("configuration: {:?}", cfg);

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        log::warn!("stopping after the current frame (Ctrl-C again to abort)");
    })
    .context("error setting Ctrl-C handler")?;

    let ui = Ui::for_stderr(args.ui);
    Ok(camfeed::run(&cfg, &ui, cancel))
}
