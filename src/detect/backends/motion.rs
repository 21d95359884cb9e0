use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use sha2::{Digest, Sha256};

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, DetectionResult};

const GRID_W: u32 = 64;
const GRID_H: u32 = 36;
/// Per-cell luma delta that counts as change.
const CELL_THRESHOLD: u8 = 24;
/// Fraction of changed cells below which the frame is considered static.
const MIN_CHANGED_FRACTION: f32 = 0.002;

/// CPU motion backend.
///
/// Downsamples each frame to a small luma grid and reports the bounding box of
/// cells that changed since the previous frame as a single `motion` detection.
#[derive(Default)]
pub struct MotionBackend {
    last_hash: Option<[u8; 32]>,
    last_grid: Option<Vec<u8>>,
}

impl MotionBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn luma_grid(image: &RgbImage) -> Vec<u8> {
        let small = imageops::resize(image, GRID_W, GRID_H, FilterType::Triangle);
        small
            .pixels()
            .map(|p| {
                let [r, g, b] = p.0;
                ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
            })
            .collect()
    }
}

impl DetectorBackend for MotionBackend {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::Motion)
    }

    fn detect(&mut self, image: &RgbImage) -> Result<DetectionResult> {
        if image.width() == 0 || image.height() == 0 {
            return Err(anyhow!("empty frame"));
        }

        let current_hash: [u8; 32] = Sha256::digest(image.as_raw()).into();
        if self.last_hash == Some(current_hash) {
            return Ok(DetectionResult::default());
        }
        self.last_hash = Some(current_hash);

        let grid = Self::luma_grid(image);
        let Some(prev) = self.last_grid.replace(grid.clone()) else {
            return Ok(DetectionResult::default());
        };

        let mut changed = 0u32;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (GRID_W, GRID_H, 0, 0);
        for (idx, (a, b)) in prev.iter().zip(grid.iter()).enumerate() {
            if a.abs_diff(*b) < CELL_THRESHOLD {
                continue;
            }
            let x = idx as u32 % GRID_W;
            let y = idx as u32 / GRID_W;
            changed += 1;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        let fraction = changed as f32 / (GRID_W * GRID_H) as f32;
        if fraction < MIN_CHANGED_FRACTION {
            return Ok(DetectionResult::default());
        }

        Ok(DetectionResult::new(vec![Detection {
            x: min_x as f32 / GRID_W as f32,
            y: min_y as f32 / GRID_H as f32,
            w: (max_x + 1 - min_x) as f32 / GRID_W as f32,
            h: (max_y + 1 - min_y) as f32 / GRID_H as f32,
            confidence: (fraction * 10.0).min(1.0),
            class_id: 0,
            label: "motion".to_string(),
        }]))
    }
}
