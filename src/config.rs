use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::DetectorSettings;
use crate::frame::StreamRequest;
use crate::session::DEFAULT_RECORD_LENGTH;
use crate::sink::{SinkKind, VideoSettings};

pub const CONFIG_ENV: &str = "CAMFEED_CONFIG";

const DEFAULT_AUTH_URL: &str = "https://carmel2.vw2-demospace.de/carmel-smart-cities-auth/";
const DEFAULT_CLIENT_ID: &str = "vw2datacapture";
const DEFAULT_REALM: &str = "icv";
const DEFAULT_DIRECTORY_URL: &str =
    "https://carmel2.vw2-demospace.de/carmel-smart-cities-cameraservice";
const DEFAULT_STREAM_ENDPOINT: &str = "https://grpc2-carmel.vw2-demospace.de:443";
const DEFAULT_DETECTOR: &str = "stub";
const DEFAULT_DISPLAY: VideoSettings = VideoSettings {
    fps: 25,
    width: 1280,
    height: 720,
};

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    auth: Option<AuthConfigFile>,
    directory_url: Option<String>,
    stream: Option<StreamConfigFile>,
    output: Option<OutputConfigFile>,
    display: Option<VideoConfigFile>,
    detector: Option<DetectorConfigFile>,
    session: Option<SessionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct AuthConfigFile {
    server_url: Option<String>,
    client_id: Option<String>,
    realm: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    endpoint: Option<String>,
    max_fps: Option<u32>,
    quality_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
    video: Option<VideoConfigFile>,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
struct VideoConfigFile {
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct SessionConfigFile {
    camera_id: Option<String>,
    record_length_secs: Option<f64>,
    default_record_length_secs: Option<f64>,
    log_frametimes: Option<bool>,
    sinks: Option<Vec<String>>,
}

/// Resolved settings for one capture run.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub auth: AuthSettings,
    pub directory_url: String,
    pub stream: StreamSettings,
    pub output_dir: PathBuf,
    pub video: VideoSettings,
    pub display: VideoSettings,
    pub detector: String,
    pub detector_settings: DetectorSettings,
    pub camera_id: Option<String>,
    pub record_length: Option<Duration>,
    pub default_record_length: Duration,
    pub log_frametimes: bool,
    pub sinks: Vec<SinkKind>,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub server_url: String,
    pub client_id: String,
    pub realm: String,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub endpoint: String,
    pub max_fps: u32,
    pub quality_size: u32,
}

impl CaptureConfig {
    /// Defaults, then the JSON file named by `CAMFEED_CONFIG`, then
    /// `CAMFEED_*` environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var(CONFIG_ENV).ok().as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CaptureConfigFile) -> Result<Self> {
        let auth = file.auth.unwrap_or_default();
        let stream = file.stream.unwrap_or_default();
        let output = file.output.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let session = file.session.unwrap_or_default();
        let detector_defaults = DetectorSettings::default();

        let sinks = match session.sinks {
            Some(names) => names
                .iter()
                .map(|name| name.parse::<SinkKind>().map_err(|e| anyhow!(e)))
                .collect::<Result<Vec<_>>>()?,
            None => vec![SinkKind::Video],
        };

        Ok(Self {
            auth: AuthSettings {
                server_url: auth.server_url.unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
                client_id: auth.client_id.unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
                realm: auth.realm.unwrap_or_else(|| DEFAULT_REALM.to_string()),
            },
            directory_url: file
                .directory_url
                .unwrap_or_else(|| DEFAULT_DIRECTORY_URL.to_string()),
            stream: StreamSettings {
                endpoint: stream
                    .endpoint
                    .unwrap_or_else(|| DEFAULT_STREAM_ENDPOINT.to_string()),
                max_fps: stream.max_fps.unwrap_or(StreamRequest::DEFAULT_MAX_FPS),
                quality_size: stream
                    .quality_size
                    .unwrap_or(StreamRequest::DEFAULT_QUALITY_SIZE),
            },
            output_dir: output.dir.unwrap_or_else(|| PathBuf::from(".")),
            video: video_settings(output.video, VideoSettings::default()),
            display: video_settings(file.display, DEFAULT_DISPLAY),
            detector: detector
                .backend
                .unwrap_or_else(|| DEFAULT_DETECTOR.to_string()),
            detector_settings: DetectorSettings {
                model_path: detector.model_path,
                input_width: detector.input_width.unwrap_or(detector_defaults.input_width),
                input_height: detector
                    .input_height
                    .unwrap_or(detector_defaults.input_height),
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(detector_defaults.confidence_threshold),
            },
            camera_id: session.camera_id,
            record_length: session
                .record_length_secs
                .map(seconds)
                .transpose()
                .context("session.record_length_secs")?,
            default_record_length: session
                .default_record_length_secs
                .map(seconds)
                .transpose()
                .context("session.default_record_length_secs")?
                .unwrap_or(DEFAULT_RECORD_LENGTH),
            log_frametimes: session.log_frametimes.unwrap_or(false),
            sinks,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_value("CAMFEED_AUTH_URL") {
            self.auth.server_url = url;
        }
        if let Some(client_id) = env_value("CAMFEED_CLIENT_ID") {
            self.auth.client_id = client_id;
        }
        if let Some(realm) = env_value("CAMFEED_REALM") {
            self.auth.realm = realm;
        }
        if let Some(url) = env_value("CAMFEED_DIRECTORY_URL") {
            self.directory_url = url;
        }
        if let Some(endpoint) = env_value("CAMFEED_STREAM_ENDPOINT") {
            self.stream.endpoint = endpoint;
        }
        if let Some(max_fps) = env_value("CAMFEED_MAX_FPS") {
            self.stream.max_fps = max_fps
                .parse()
                .map_err(|_| anyhow!("CAMFEED_MAX_FPS must be a positive integer"))?;
        }
        if let Some(size) = env_value("CAMFEED_QUALITY_SIZE") {
            self.stream.quality_size = size
                .parse()
                .map_err(|_| anyhow!("CAMFEED_QUALITY_SIZE must be a positive integer"))?;
        }
        if let Some(dir) = env_value("CAMFEED_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(detector) = env_value("CAMFEED_DETECTOR") {
            self.detector = detector;
        }
        if let Some(path) = env_value("CAMFEED_MODEL_PATH") {
            self.detector_settings.model_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    /// Check invariants. Also called after CLI overrides are applied.
    pub fn validate(&mut self) -> Result<()> {
        for (name, url) in [
            ("auth server url", &self.auth.server_url),
            ("camera directory url", &self.directory_url),
            ("stream endpoint", &self.stream.endpoint),
        ] {
            url::Url::parse(url).with_context(|| format!("invalid {}: {}", name, url))?;
        }
        if self.auth.client_id.trim().is_empty() || self.auth.realm.trim().is_empty() {
            return Err(anyhow!("client id and realm must not be empty"));
        }
        if self.stream.max_fps == 0 || self.stream.quality_size == 0 {
            return Err(anyhow!("max_fps and quality_size must be greater than zero"));
        }
        for (name, video) in [("output video", self.video), ("display", self.display)] {
            if video.fps == 0 || video.width == 0 || video.height == 0 {
                return Err(anyhow!("{} fps, width and height must be non-zero", name));
            }
        }
        if let Some(id) = self.camera_id.as_deref() {
            id.trim()
                .parse::<i32>()
                .map_err(|_| anyhow!("camera id '{}' is not numeric", id))?;
        }
        if matches!(self.record_length, Some(length) if length.is_zero())
            || self.default_record_length.is_zero()
        {
            return Err(anyhow!("record length must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detector_settings.confidence_threshold) {
            return Err(anyhow!("confidence threshold must lie in [0, 1]"));
        }
        if self.sinks.is_empty() {
            return Err(anyhow!("at least one sink must be selected"));
        }
        let mut seen = Vec::with_capacity(self.sinks.len());
        self.sinks.retain(|kind| {
            let first = !seen.contains(kind);
            seen.push(*kind);
            first
        });
        Ok(())
    }
}

fn video_settings(file: Option<VideoConfigFile>, defaults: VideoSettings) -> VideoSettings {
    let file = file.unwrap_or_default();
    VideoSettings {
        fps: file.fps.unwrap_or(defaults.fps),
        width: file.width.unwrap_or(defaults.width),
        height: file.height.unwrap_or(defaults.height),
    }
}

fn seconds(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|e| anyhow!("invalid number of seconds: {}", e))
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<CaptureConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
