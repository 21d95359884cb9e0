use std::path::PathBuf;

use super::annotate::draw_detections;
use super::{FrameSink, VideoEncoder, Viewer};
use crate::detect::{Detection, DetectorBackend};
use crate::error::InferenceError;
use crate::frame::Frame;

/// Runs a detector on every frame and records/shows the annotated image.
///
/// Decode and detector failures drop the frame; the session continues.
pub struct InferenceSink {
    detector: Box<dyn DetectorBackend>,
    encoder: Option<Box<dyn VideoEncoder>>,
    viewer: Option<Box<dyn Viewer>>,
    paths: Vec<PathBuf>,
    finalized: bool,
    processed: u64,
    skipped: u64,
    detections: u64,
    best: Option<Detection>,
}

impl InferenceSink {
    pub fn new(detector: Box<dyn DetectorBackend>) -> Self {
        Self {
            detector,
            encoder: None,
            viewer: None,
            paths: Vec::new(),
            finalized: false,
            processed: 0,
            skipped: 0,
            detections: 0,
            best: None,
        }
    }

    pub fn with_encoder(mut self, encoder: Box<dyn VideoEncoder>) -> Self {
        self.paths.push(encoder.path().to_path_buf());
        self.encoder = Some(encoder);
        self
    }

    pub fn with_viewer(mut self, viewer: Box<dyn Viewer>) -> Self {
        self.viewer = Some(viewer);
        self
    }

    pub fn frames_processed(&self) -> u64 {
        self.processed
    }

    pub fn frames_skipped(&self) -> u64 {
        self.skipped
    }

    pub fn detections_total(&self) -> u64 {
        self.detections
    }

    /// Highest-confidence detection seen so far.
    pub fn best_detection(&self) -> Option<&Detection> {
        self.best.as_ref()
    }
}

impl FrameSink for InferenceSink {
    fn name(&self) -> &'static str {
        "inference"
    }

    fn consume(&mut self, frame: &Frame) {
        if self.finalized {
            return;
        }
        let mut image = match frame.decode() {
            Ok(image) => image,
            Err(e) => {
                self.skipped += 1;
                log::warn!("inference: skipping frame: {}", e);
                return;
            }
        };
        let result = match self.detector.detect(&image) {
            Ok(result) => result,
            Err(e) => {
                self.skipped += 1;
                let err = InferenceError::Detect {
                    backend: self.detector.name(),
                    seq: frame.seq,
                    reason: format!("{:#}", e),
                };
                log::warn!("inference: skipping frame: {}", err);
                return;
            }
        };

        self.processed += 1;
        self.detections += result.detections.len() as u64;
        if let Some(best) = result.best() {
            if self.best.as_ref().map_or(true, |b| best.confidence > b.confidence) {
                self.best = Some(best.clone());
            }
        }
        for det in &result.detections {
            log::debug!(
                "frame {}: {} {:.2} at ({:.3},{:.3},{:.3},{:.3})",
                frame.seq,
                det.label,
                det.confidence,
                det.x,
                det.y,
                det.w,
                det.h
            );
        }
        draw_detections(&mut image, &result.detections);

        if let Some(encoder) = self.encoder.as_mut() {
            if let Err(e) = encoder.write_frame(frame.seq, &image) {
                log::warn!("inference: annotated frame not recorded: {}", e);
            }
        }
        if let Some(viewer) = self.viewer.as_mut() {
            if let Err(e) = viewer.show(&image) {
                log::warn!("inference: frame {} not shown: {}", frame.seq, e);
            }
        }
    }

    fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        if let Some(mut encoder) = self.encoder.take() {
            if let Err(e) = encoder.finish() {
                log::error!(
                    "inference: failed to finalize {}: {}",
                    encoder.path().display(),
                    e
                );
            }
        }
        if let Some(mut viewer) = self.viewer.take() {
            viewer.close();
        }
        log::info!(
            "inference[{}]: {} frames processed, {} skipped, {} detections",
            self.detector.name(),
            self.processed,
            self.skipped,
            self.detections
        );
        if let Some(best) = self.best.as_ref() {
            log::info!("inference: best detection {} {:.2}", best.label, best.confidence);
        }
    }

    fn stop_requested(&mut self) -> bool {
        match self.viewer.as_mut() {
            Some(viewer) => viewer.closed(),
            None => false,
        }
    }

    fn outputs(&self) -> Vec<PathBuf> {
        self.paths.clone()
    }
}
