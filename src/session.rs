//! Capture session orchestration.
//!
//! `Idle → Authenticating → ListingCameras → [AwaitingSelection] → Streaming
//! → Finalizing → Done`. Failures before `Streaming` abort without opening
//! any output. Once streaming, every exit path (stream end, stream error,
//! duration, stop request, cancellation, panic) finalizes each sink once.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::auth::{ClientCredentials, TokenProvider};
use crate::directory::{camera_name_for_id, CameraDescriptor, CameraDirectory};
use crate::error::{ConfigError, SessionError, StreamError};
use crate::frame::StreamRequest;
use crate::sink::{FrameSink, SinkFactory};
use crate::stream::FrameStreamClient;
use crate::ui::Ui;

pub const DEFAULT_RECORD_LENGTH: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Authenticating,
    ListingCameras,
    AwaitingSelection,
    Streaming,
    Finalizing,
    Done,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    /// Server closed the stream.
    StreamEnded,
    /// Transport error mid-stream.
    StreamFailed(String),
    /// Elapsed time exceeded the configured duration.
    DurationElapsed,
    /// A sink asked to stop (viewer closed).
    StopRequested(&'static str),
    /// Process-level cancellation (Ctrl-C).
    Cancelled,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::StreamEnded => write!(f, "stream ended"),
            TerminationReason::StreamFailed(e) => write!(f, "stream failed: {}", e),
            TerminationReason::DurationElapsed => write!(f, "record length reached"),
            TerminationReason::StopRequested(sink) => write!(f, "stop requested by {}", sink),
            TerminationReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Resolves values the operator did not supply up front.
pub trait Selector {
    fn select_camera(&mut self, cameras: &[CameraDescriptor]) -> Result<String, ConfigError>;

    fn select_duration(&mut self, default: Duration) -> Result<Duration, ConfigError>;
}

/// Selector for non-interactive runs: any missing value is an error.
pub struct NoSelection;

impl Selector for NoSelection {
    fn select_camera(&mut self, _cameras: &[CameraDescriptor]) -> Result<String, ConfigError> {
        Err(ConfigError::SelectionAborted(
            "no camera id supplied and prompting is disabled".into(),
        ))
    }

    fn select_duration(&mut self, _default: Duration) -> Result<Duration, ConfigError> {
        Err(ConfigError::SelectionAborted(
            "no record length supplied and prompting is disabled".into(),
        ))
    }
}

pub trait Clock {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Everything a session needs to know before it starts.
#[derive(Clone, Debug)]
pub struct SessionPlan {
    pub credentials: ClientCredentials,
    pub camera_id: Option<String>,
    pub record_length: Option<Duration>,
    pub default_record_length: Duration,
    pub max_fps: u32,
    pub quality_size: u32,
    pub log_frametimes: bool,
    pub output_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub camera: CameraDescriptor,
    pub frames: u64,
    pub elapsed: Duration,
    pub reason: TerminationReason,
    pub outputs: Vec<PathBuf>,
    pub frametime_log: Option<PathBuf>,
}

impl SessionSummary {
    pub fn average_fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }

    /// Process exit status: 0 unless the stream failed mid-session.
    pub fn exit_status(&self) -> u8 {
        match self.reason {
            TerminationReason::StreamFailed(_) => EXIT_STREAM_FAILED,
            _ => 0,
        }
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Retrieved {} frames in {:.2}s. Avg.: {:.2}fps",
            self.frames,
            self.elapsed.as_secs_f64(),
            self.average_fps()
        )
    }
}

pub const EXIT_FATAL: u8 = 1;
pub const EXIT_STREAM_FAILED: u8 = 3;

/// Exit status for a finished or aborted session.
pub fn exit_status(result: &Result<SessionSummary, SessionError>) -> u8 {
    match result {
        Ok(summary) => summary.exit_status(),
        Err(_) => EXIT_FATAL,
    }
}

/// `{UTC timestamp}_id{camera_id}_{camera_name}` inside `dir`.
pub fn output_base(dir: &Path, started: DateTime<Utc>, camera: &CameraDescriptor) -> PathBuf {
    let name: String = camera
        .name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            other => other,
        })
        .collect();
    dir.join(format!(
        "{}_id{}_{}",
        started.format("%Y-%m-%dT%H-%M-%SZ"),
        camera.id,
        name
    ))
}

/// Frametime log: one elapsed-seconds value per line, arrival order.
struct FrametimeLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl FrametimeLog {
    fn create(path: PathBuf) -> std::io::Result<Self> {
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    fn record(&mut self, frametime: Duration) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writeln!(writer, "{:.5}", frametime.as_secs_f64()) {
                log::warn!("frametime log {} disabled: {}", self.path.display(), e);
                self.writer = None;
            }
        }
    }

    fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                log::warn!("failed to flush {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Owns the sinks for the duration of streaming and finalizes them exactly
/// once, on drop if nothing else did.
struct SinkSet {
    sinks: Vec<Box<dyn FrameSink>>,
    finalized: bool,
}

impl SinkSet {
    fn new(sinks: Vec<Box<dyn FrameSink>>) -> Self {
        Self {
            sinks,
            finalized: false,
        }
    }

    fn finalize_all(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        for sink in self.sinks.iter_mut() {
            sink.finalize();
        }
    }

    fn outputs(&self) -> Vec<PathBuf> {
        self.sinks.iter().flat_map(|sink| sink.outputs()).collect()
    }
}

impl Drop for SinkSet {
    fn drop(&mut self) {
        self.finalize_all();
    }
}

pub struct SessionRunner<'a> {
    tokens: &'a dyn TokenProvider,
    directory: &'a dyn CameraDirectory,
    streams: &'a dyn FrameStreamClient,
    sinks: &'a dyn SinkFactory,
    clock: Box<dyn Clock + 'a>,
    cancel: Arc<AtomicBool>,
    ui: Option<Ui>,
    state: SessionState,
    history: Vec<SessionState>,
}

impl<'a> SessionRunner<'a> {
    pub fn new(
        tokens: &'a dyn TokenProvider,
        directory: &'a dyn CameraDirectory,
        streams: &'a dyn FrameStreamClient,
        sinks: &'a dyn SinkFactory,
    ) -> Self {
        Self {
            tokens,
            directory,
            streams,
            sinks,
            clock: Box::new(SystemClock),
            cancel: Arc::new(AtomicBool::new(false)),
            ui: None,
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Flag checked between frames; setting it ends the session cleanly.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_ui(mut self, ui: Ui) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    fn enter(&mut self, state: SessionState) {
        log::debug!("session: {:?} -> {:?}", self.state, state);
        self.state = state;
        self.history.push(state);
    }

    pub fn run(
        &mut self,
        plan: &SessionPlan,
        selector: &mut dyn Selector,
    ) -> Result<SessionSummary, SessionError> {
        let result = self.run_inner(plan, selector);
        if self.state != SessionState::Done {
            self.enter(SessionState::Done);
        }
        result
    }

    fn run_inner(
        &mut self,
        plan: &SessionPlan,
        selector: &mut dyn Selector,
    ) -> Result<SessionSummary, SessionError> {
        self.enter(SessionState::Authenticating);
        let credential = {
            let _stage = self.ui.as_ref().map(|ui| ui.stage("Authenticating"));
            self.tokens.obtain(&plan.credentials)?
        };
        if let Some(expiry) = credential.expires_in() {
            log::debug!("token valid for {}s", expiry.as_secs());
        }

        self.enter(SessionState::ListingCameras);
        let cameras = {
            let _stage = self.ui.as_ref().map(|ui| ui.stage("Fetching camera list"));
            self.directory.list(&credential)?
        };
        log::info!("{} cameras available", cameras.len());

        let (camera_id, record_length) = self.resolve_selection(plan, &cameras, selector)?;
        let camera = CameraDescriptor {
            name: camera_name_for_id(&cameras, &camera_id)
                .ok_or_else(|| ConfigError::UnknownCamera(camera_id.clone()))?
                .to_string(),
            id: camera_id,
        };

        self.enter(SessionState::Streaming);
        let base = output_base(&plan.output_dir, Utc::now(), &camera);
        log::info!(
            "About to capture {}s from camera with id {} ({}).",
            record_length.as_secs_f64(),
            camera.id,
            camera.name
        );

        let request = StreamRequest {
            camera_id: camera.id.clone(),
            max_fps: plan.max_fps,
            quality_size: plan.quality_size,
        };
        let mut stream = self.streams.open(&request, &credential)?;

        std::fs::create_dir_all(&plan.output_dir)?;
        let mut sinks = SinkSet::new(self.sinks.build(&base)?);
        let mut frametimes = if plan.log_frametimes {
            let mut path = base.as_os_str().to_owned();
            path.push(".frametimes");
            Some(FrametimeLog::create(PathBuf::from(path))?)
        } else {
            None
        };

        let start = self.clock.now();
        let mut last = start;
        let mut frames = 0u64;
        let mut last_seq = 0u64;
        let mut reason = TerminationReason::StreamEnded;

        for item in stream.by_ref() {
            let frame = match item {
                Ok(frame) => frame,
                Err(err) => {
                    log::error!("{}", err);
                    reason = TerminationReason::StreamFailed(err.to_string());
                    break;
                }
            };
            debug_assert!(frame.seq >= last_seq, "frames must arrive in order");
            last_seq = frame.seq;

            let frametime = frame.arrived.saturating_duration_since(last);
            last = frame.arrived;
            log::debug!(
                "Frametime: {:.5}s (frame {}, {} bytes)",
                frametime.as_secs_f64(),
                frame.seq,
                frame.len()
            );
            if let Some(log) = frametimes.as_mut() {
                log.record(frametime);
            }

            for sink in sinks.sinks.iter_mut() {
                sink.consume(&frame);
            }
            frames += 1;

            if let Some(index) = sinks.sinks.iter_mut().position(|sink| sink.stop_requested()) {
                reason = TerminationReason::StopRequested(sinks.sinks[index].name());
                break;
            }
            if self.cancel.load(Ordering::SeqCst) {
                reason = TerminationReason::Cancelled;
                break;
            }
            if self.clock.now().saturating_duration_since(start) > record_length {
                reason = TerminationReason::DurationElapsed;
                break;
            }
        }
        let elapsed = self.clock.now().saturating_duration_since(start);
        // Cancel the call before flushing outputs.
        drop(stream);

        self.enter(SessionState::Finalizing);
        log::info!("session ended: {}", reason);
        sinks.finalize_all();
        let frametime_log = frametimes.as_mut().map(|log| {
            log.close();
            log.path.clone()
        });

        let summary = SessionSummary {
            camera,
            frames,
            elapsed,
            reason,
            outputs: sinks.outputs(),
            frametime_log,
        };
        self.enter(SessionState::Done);
        Ok(summary)
    }

    fn resolve_selection(
        &mut self,
        plan: &SessionPlan,
        cameras: &[CameraDescriptor],
        selector: &mut dyn Selector,
    ) -> Result<(String, Duration), SessionError> {
        if plan.camera_id.is_none() || plan.record_length.is_none() {
            self.enter(SessionState::AwaitingSelection);
        }
        let camera_id = match &plan.camera_id {
            Some(id) => id.clone(),
            None => {
                if cameras.is_empty() {
                    return Err(ConfigError::SelectionAborted(
                        "the camera directory is empty".into(),
                    )
                    .into());
                }
                selector.select_camera(cameras)?
            }
        };
        let record_length = match plan.record_length {
            Some(length) => length,
            None => selector.select_duration(plan.default_record_length)?,
        };
        let Ok(parsed) = camera_id.trim().parse::<i32>() else {
            return Err(ConfigError::Invalid(format!("camera id '{}' is not numeric", camera_id)).into());
        };
        if record_length.is_zero() {
            return Err(ConfigError::Invalid("record length must be greater than zero".into()).into());
        }
        // The directory lists ids in canonical form ("7", never "07").
        Ok((parsed.to_string(), record_length))
    }
}

impl From<StreamError> for TerminationReason {
    fn from(err: StreamError) -> Self {
        TerminationReason::StreamFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn output_base_follows_naming_scheme() {
        let started = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();
        let camera = CameraDescriptor {
            id: "12".into(),
            name: "North/Gate".into(),
        };
        let base = output_base(Path::new("/data"), started, &camera);
        assert_eq!(
            base,
            PathBuf::from("/data/2024-03-05T07-08-09Z_id12_North_Gate")
        );
    }

    #[test]
    fn summary_line_matches_recorder_format() {
        let summary = SessionSummary {
            camera: CameraDescriptor {
                id: "1".into(),
                name: "A".into(),
            },
            frames: 50,
            elapsed: Duration::from_millis(5000),
            reason: TerminationReason::DurationElapsed,
            outputs: vec![],
            frametime_log: None,
        };
        assert_eq!(summary.to_string(), "Retrieved 50 frames in 5.00s. Avg.: 10.00fps");
        assert_eq!(summary.exit_status(), 0);
    }

    #[test]
    fn zero_elapsed_reports_zero_fps() {
        let summary = SessionSummary {
            camera: CameraDescriptor {
                id: "1".into(),
                name: "A".into(),
            },
            frames: 0,
            elapsed: Duration::ZERO,
            reason: TerminationReason::StreamEnded,
            outputs: vec![],
            frametime_log: None,
        };
        assert_eq!(summary.average_fps(), 0.0);
    }

    #[test]
    fn stream_failure_maps_to_distinct_exit_status() {
        let summary = SessionSummary {
            camera: CameraDescriptor {
                id: "1".into(),
                name: "A".into(),
            },
            frames: 3,
            elapsed: Duration::from_secs(1),
            reason: StreamError::Transport("reset".into()).into(),
            outputs: vec![],
            frametime_log: None,
        };
        assert_eq!(exit_status(&Ok(summary)), EXIT_STREAM_FAILED);
        let err: Result<SessionSummary, SessionError> =
            Err(ConfigError::Invalid("x".into()).into());
        assert_eq!(exit_status(&err), EXIT_FATAL);
    }
}
