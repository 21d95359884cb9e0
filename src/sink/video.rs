use std::path::PathBuf;

use super::{FrameSink, VideoEncoder};
use crate::frame::Frame;

/// Records the raw stream into a video container.
///
/// Frames are appended at the encoder's fixed rate regardless of arrival
/// jitter. A frame that cannot be decoded or encoded is skipped.
pub struct VideoFileSink {
    encoder: Option<Box<dyn VideoEncoder>>,
    path: PathBuf,
    written: u64,
    skipped: u64,
}

impl VideoFileSink {
    pub fn new(encoder: Box<dyn VideoEncoder>) -> Self {
        let path = encoder.path().to_path_buf();
        Self {
            encoder: Some(encoder),
            path,
            written: 0,
            skipped: 0,
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    pub fn frames_skipped(&self) -> u64 {
        self.skipped
    }
}

impl FrameSink for VideoFileSink {
    fn name(&self) -> &'static str {
        "video"
    }

    fn consume(&mut self, frame: &Frame) {
        let Some(encoder) = self.encoder.as_mut() else {
            return;
        };
        let result = frame
            .decode()
            .and_then(|image| encoder.write_frame(frame.seq, &image));
        match result {
            Ok(()) => self.written += 1,
            Err(e) => {
                self.skipped += 1;
                log::warn!("video: skipping frame: {}", e);
            }
        }
    }

    fn finalize(&mut self) {
        let Some(mut encoder) = self.encoder.take() else {
            return;
        };
        if let Err(e) = encoder.finish() {
            log::error!("video: failed to finalize {}: {}", self.path.display(), e);
        }
        log::info!(
            "video: {} frames written, {} skipped, {}",
            self.written,
            self.skipped,
            self.path.display()
        );
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::Path;
    use std::rc::Rc;
    use std::time::Instant;

    use image::RgbImage;

    use super::*;
    use crate::error::EncodeError;
    use crate::frame::test_support::jpeg;

    #[derive(Default)]
    struct Log {
        frames: Vec<u64>,
        finished: u32,
    }

    struct CountingEncoder(Rc<RefCell<Log>>);

    impl VideoEncoder for CountingEncoder {
        fn write_frame(&mut self, seq: u64, _image: &RgbImage) -> Result<(), EncodeError> {
            self.0.borrow_mut().frames.push(seq);
            Ok(())
        }

        fn finish(&mut self) -> std::io::Result<()> {
            self.0.borrow_mut().finished += 1;
            Ok(())
        }

        fn path(&self) -> &Path {
            Path::new("test.avi")
        }
    }

    #[test]
    fn one_bad_frame_is_skipped() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut sink = VideoFileSink::new(Box::new(CountingEncoder(log.clone())));
        let good = jpeg(16, 16, [10, 200, 10]);

        for seq in 1..=100u64 {
            let data = if seq == 37 { b"not a jpeg".to_vec() } else { good.clone() };
            sink.consume(&Frame::new(data, seq, Instant::now()));
        }
        sink.finalize();
        sink.finalize();

        assert_eq!(sink.frames_written(), 99);
        assert_eq!(sink.frames_skipped(), 1);
        let log = log.borrow();
        assert_eq!(log.frames.len(), 99);
        assert!(!log.frames.contains(&37));
        assert_eq!(log.finished, 1);
    }

    #[test]
    fn frames_after_finalize_are_ignored() {
        let log = Rc::new(RefCell::new(Log::default()));
        let mut sink = VideoFileSink::new(Box::new(CountingEncoder(log.clone())));
        sink.finalize();
        sink.consume(&Frame::new(jpeg(8, 8, [0, 0, 0]), 1, Instant::now()));
        assert!(log.borrow().frames.is_empty());
        assert_eq!(sink.outputs(), vec![PathBuf::from("test.avi")]);
    }
}
