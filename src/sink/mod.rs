//! Frame sinks.
//!
//! Every sink sees every frame, in arrival order, on the session thread. A
//! sink never feeds anything back into the stream except a stop request.
//! Per-frame failures (undecodable payload, detector error) are logged and the
//! frame is skipped; they never end the session.

mod annotate;
mod display;
mod ffmpeg;
mod inference;
mod video;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::RgbImage;

pub use annotate::draw_detections;
pub use display::DisplaySink;
pub use ffmpeg::{FfmpegEncoder, FfplayViewer};
pub use inference::InferenceSink;
pub use video::VideoFileSink;

use crate::detect::{BackendRegistry, DetectorSettings};
use crate::error::{EncodeError, SinkError};
use crate::frame::Frame;

pub trait FrameSink {
    fn name(&self) -> &'static str;

    /// Handle one frame. Errors are the sink's to log and swallow.
    fn consume(&mut self, frame: &Frame);

    /// Release outputs. Safe to call more than once; only the first call acts.
    fn finalize(&mut self);

    /// Cooperative request to end the session (e.g. viewer closed).
    fn stop_requested(&mut self) -> bool {
        false
    }

    /// Files this sink produced, reported in the session summary.
    fn outputs(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Appends decoded frames to a video container at a fixed rate and size.
pub trait VideoEncoder {
    fn write_frame(&mut self, seq: u64, image: &RgbImage) -> Result<(), EncodeError>;

    /// Flush and close the container.
    fn finish(&mut self) -> std::io::Result<()>;

    fn path(&self) -> &Path;
}

/// An on-screen surface for decoded frames.
pub trait Viewer {
    fn show(&mut self, image: &RgbImage) -> std::io::Result<()>;

    /// True once the user has closed the surface.
    fn closed(&mut self) -> bool;

    fn close(&mut self);
}

/// The closed set of sink variants a session can be configured with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SinkKind {
    Video,
    Display,
    Inference,
}

impl FromStr for SinkKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "video" | "record" => Ok(SinkKind::Video),
            "display" | "show" => Ok(SinkKind::Display),
            "inference" | "detect" => Ok(SinkKind::Inference),
            other => Err(format!(
                "unknown sink '{}'; expected video, display or inference",
                other
            )),
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKind::Video => write!(f, "video"),
            SinkKind::Display => write!(f, "display"),
            SinkKind::Inference => write!(f, "inference"),
        }
    }
}

/// Fixed output geometry for encoders and viewers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoSettings {
    pub fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            fps: 25,
            width: 1920,
            height: 1080,
        }
    }
}

/// Opens the external encoder and viewer processes behind [`StandardSinks`].
pub trait MediaSpawner {
    fn encoder(&self, path: &Path, settings: VideoSettings)
        -> Result<Box<dyn VideoEncoder>, SinkError>;

    fn viewer(&self, settings: VideoSettings) -> Result<Box<dyn Viewer>, SinkError>;
}

/// `ffmpeg` for recording, `ffplay` for display.
pub struct FfmpegMedia;

impl MediaSpawner for FfmpegMedia {
    fn encoder(
        &self,
        path: &Path,
        settings: VideoSettings,
    ) -> Result<Box<dyn VideoEncoder>, SinkError> {
        Ok(Box::new(FfmpegEncoder::spawn(path, settings)?))
    }

    fn viewer(&self, settings: VideoSettings) -> Result<Box<dyn Viewer>, SinkError> {
        Ok(Box::new(FfplayViewer::spawn(settings)?))
    }
}

/// Builds the session's sinks once the camera is known.
pub trait SinkFactory {
    /// `base` is the output path without extension.
    fn build(&self, base: &Path) -> Result<Vec<Box<dyn FrameSink>>, SinkError>;
}

/// Sink set backed by a [`MediaSpawner`] and the detector registry.
///
/// - `Video` records the raw stream to `{base}.avi`.
/// - `Inference` records annotated frames to `{base}_annotated.avi`.
/// - `Display` shows raw frames, or annotated ones when `Inference` is also
///   selected (a single window either way).
pub struct StandardSinks {
    pub kinds: Vec<SinkKind>,
    pub video: VideoSettings,
    pub display: VideoSettings,
    pub detector: String,
    pub detector_settings: DetectorSettings,
    pub registry: BackendRegistry,
    pub media: Box<dyn MediaSpawner>,
}

impl StandardSinks {
    fn has(&self, kind: SinkKind) -> bool {
        self.kinds.contains(&kind)
    }

    fn build_into(
        &self,
        base: &Path,
        sinks: &mut Vec<Box<dyn FrameSink>>,
    ) -> Result<(), SinkError> {
        if self.has(SinkKind::Video) {
            let encoder = self.media.encoder(&with_suffix(base, ".avi"), self.video)?;
            sinks.push(Box::new(VideoFileSink::new(encoder)));
        }

        if self.has(SinkKind::Inference) {
            let backend = self
                .registry
                .build(&self.detector, &self.detector_settings)
                .map_err(|e| SinkError::Open {
                    what: format!("detector '{}'", self.detector),
                    reason: format!("{:#}", e),
                })?;
            if backend.name() == "stub" {
                log::warn!(
                    "inference uses the 'stub' detector: frames are recorded without detections \
                     (choose another with --detector)"
                );
            }
            let encoder = self
                .media
                .encoder(&with_suffix(base, "_annotated.avi"), self.video)?;
            let mut sink = InferenceSink::new(backend).with_encoder(encoder);
            if self.has(SinkKind::Display) {
                match self.media.viewer(self.display) {
                    Ok(viewer) => sink = sink.with_viewer(viewer),
                    Err(err) => {
                        sink.finalize();
                        return Err(err);
                    }
                }
            }
            sinks.push(Box::new(sink));
        } else if self.has(SinkKind::Display) {
            let viewer = self.media.viewer(self.display)?;
            sinks.push(Box::new(DisplaySink::new(viewer)));
        }
        Ok(())
    }
}

impl SinkFactory for StandardSinks {
    fn build(&self, base: &Path) -> Result<Vec<Box<dyn FrameSink>>, SinkError> {
        let mut sinks: Vec<Box<dyn FrameSink>> = Vec::new();
        if let Err(err) = self.build_into(base, &mut sinks) {
            // Release whatever opened before the failure.
            for sink in sinks.iter_mut() {
                sink.finalize();
            }
            return Err(err);
        }
        Ok(sinks)
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
