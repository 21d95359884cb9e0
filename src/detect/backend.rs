use anyhow::Result;
use image::RgbImage;

use crate::detect::result::DetectionResult;

/// Detection capabilities supported by backends.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    Motion,
    ObjectDetection,
}

/// Detector backend trait.
///
/// Backends see decoded RGB frames in arrival order, one at a time, on the
/// session thread. A backend may keep state between frames (the motion
/// backend keeps the previous frame's grid) but must not retain the image.
pub trait DetectorBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on a frame. Box coordinates are normalized to 0..1.
    fn detect(&mut self, image: &RgbImage) -> Result<DetectionResult>;

    /// Optional warm-up hook, called once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
