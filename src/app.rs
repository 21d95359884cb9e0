//! Process-level entry point: build the real collaborators from a
//! [`CaptureConfig`] and run one session.

use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::auth::{client_secret_from_env_or_prompt, ClientCredentials, KeycloakTokenProvider};
use crate::config::CaptureConfig;
use crate::detect::BackendRegistry;
use crate::directory::HttpCameraDirectory;
use crate::error::SessionError;
use crate::select::PromptSelector;
use crate::session::{
    exit_status, NoSelection, SessionPlan, SessionRunner, SessionSummary, Selector,
};
use crate::sink::{FfmpegMedia, StandardSinks};
use crate::stream::GrpcFrameStreamClient;
use crate::ui::Ui;

pub fn session_plan(config: &CaptureConfig, client_secret: String) -> SessionPlan {
    SessionPlan {
        credentials: ClientCredentials {
            server_url: config.auth.server_url.clone(),
            client_id: config.auth.client_id.clone(),
            realm: config.auth.realm.clone(),
            client_secret,
        },
        camera_id: config.camera_id.clone(),
        record_length: config.record_length,
        default_record_length: config.default_record_length,
        max_fps: config.stream.max_fps,
        quality_size: config.stream.quality_size,
        log_frametimes: config.log_frametimes,
        output_dir: config.output_dir.clone(),
    }
}

pub fn standard_sinks(config: &CaptureConfig) -> StandardSinks {
    StandardSinks {
        kinds: config.sinks.clone(),
        video: config.video,
        display: config.display,
        detector: config.detector.clone(),
        detector_settings: config.detector_settings.clone(),
        registry: BackendRegistry::with_builtin(),
        media: Box::new(FfmpegMedia),
    }
}

fn capture(
    config: &CaptureConfig,
    ui: &Ui,
    cancel: Arc<AtomicBool>,
) -> Result<SessionSummary, SessionError> {
    let plan = session_plan(config, client_secret_from_env_or_prompt()?);

    let tokens = KeycloakTokenProvider::new();
    let directory = HttpCameraDirectory::new(config.directory_url.clone());
    let streams = GrpcFrameStreamClient::new(config.stream.endpoint.clone());
    let sinks = standard_sinks(config);

    let mut selector: Box<dyn Selector> = if std::io::stdin().is_terminal() {
        Box::new(PromptSelector::stdio())
    } else {
        Box::new(NoSelection)
    };

    let mut runner = SessionRunner::new(&tokens, &directory, &streams, &sinks)
        .with_cancel_flag(cancel)
        .with_ui(ui.clone());
    runner.run(&plan, selector.as_mut())
}

/// Run one capture session and map the outcome to a process exit code.
pub fn run(config: &CaptureConfig, ui: &Ui, cancel: Arc<AtomicBool>) -> ExitCode {
    let result = capture(config, ui, cancel);
    match &result {
        Ok(summary) => ui.summary(summary),
        Err(err) => log::error!("{}", err),
    }
    ExitCode::from(exit_status(&result))
}
