//! Frames as delivered by the camera stream.
//!
//! A `Frame` holds the encoded image exactly as the server pushed it. Decoding
//! happens lazily in the sink that needs pixels; the bytes are never mutated.

use std::time::Instant;

use image::RgbImage;

use crate::error::EncodeError;

/// Server-side stream parameters, fixed for the lifetime of one call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamRequest {
    pub camera_id: String,
    pub max_fps: u32,
    pub quality_size: u32,
}

impl StreamRequest {
    pub const DEFAULT_MAX_FPS: u32 = 100;
    pub const DEFAULT_QUALITY_SIZE: u32 = 100;

    pub fn new(camera_id: impl Into<String>) -> Self {
        Self {
            camera_id: camera_id.into(),
            max_fps: Self::DEFAULT_MAX_FPS,
            quality_size: Self::DEFAULT_QUALITY_SIZE,
        }
    }
}

/// One encoded frame with its arrival time.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    /// 1-based arrival order within the stream.
    pub seq: u64,
    /// Monotonic arrival instant, used for frametime accounting.
    pub arrived: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, seq: u64, arrived: Instant) -> Self {
        Self {
            data,
            seq,
            arrived,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decode the payload (JPEG in practice, any format `image` recognizes).
    pub fn decode(&self) -> Result<RgbImage, EncodeError> {
        if self.is_empty() {
            return Err(EncodeError::Decode {
                seq: self.seq,
                reason: "empty payload".to_string(),
            });
        }
        let image = image::load_from_memory(&self.data).map_err(|e| EncodeError::Decode {
            seq: self.seq,
            reason: e.to_string(),
        })?;
        Ok(image.into_rgb8())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    /// Encode a solid-colour JPEG for tests.
    pub fn jpeg(width: u32, height: u32, colour: [u8; 3]) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb(colour));
        let mut out = Cursor::new(Vec::new());
        image
            .write_to(&mut out, ImageFormat::Jpeg)
            .expect("encode test jpeg");
        out.into_inner()
    }
}
