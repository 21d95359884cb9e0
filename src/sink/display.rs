use super::{FrameSink, Viewer};
use crate::frame::Frame;

/// Shows the raw stream on screen. Closing the viewer stops the session.
pub struct DisplaySink {
    viewer: Option<Box<dyn Viewer>>,
    shown: u64,
}

impl DisplaySink {
    pub fn new(viewer: Box<dyn Viewer>) -> Self {
        Self {
            viewer: Some(viewer),
            shown: 0,
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.shown
    }
}

impl FrameSink for DisplaySink {
    fn name(&self) -> &'static str {
        "display"
    }

    fn consume(&mut self, frame: &Frame) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        let image = match frame.decode() {
            Ok(image) => image,
            Err(e) => {
                log::warn!("display: skipping frame: {}", e);
                return;
            }
        };
        match viewer.show(&image) {
            Ok(()) => self.shown += 1,
            Err(e) => log::warn!("display: frame {} not shown: {}", frame.seq, e),
        }
    }

    fn finalize(&mut self) {
        if let Some(mut viewer) = self.viewer.take() {
            viewer.close();
            log::info!("display: {} frames shown", self.shown);
        }
    }

    fn stop_requested(&mut self) -> bool {
        match self.viewer.as_mut() {
            Some(viewer) => viewer.closed(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Instant;

    use image::RgbImage;

    use super::*;
    use crate::frame::test_support::jpeg;

    struct ScriptedViewer {
        close_after: u64,
        shown: u64,
        closes: Rc<Cell<u32>>,
    }

    impl Viewer for ScriptedViewer {
        fn show(&mut self, _image: &RgbImage) -> std::io::Result<()> {
            self.shown += 1;
            Ok(())
        }

        fn closed(&mut self) -> bool {
            self.shown >= self.close_after
        }

        fn close(&mut self) {
            self.closes.set(self.closes.get() + 1);
        }
    }

    #[test]
    fn closing_viewer_requests_stop() {
        let closes = Rc::new(Cell::new(0));
        let mut sink = DisplaySink::new(Box::new(ScriptedViewer {
            close_after: 3,
            shown: 0,
            closes: closes.clone(),
        }));
        let data = jpeg(8, 8, [1, 2, 3]);
        for seq in 1..=2 {
            sink.consume(&Frame::new(data.clone(), seq, Instant::now()));
            assert!(!sink.stop_requested());
        }
        sink.consume(&Frame::new(data, 3, Instant::now()));
        assert!(sink.stop_requested());

        sink.finalize();
        sink.finalize();
        assert_eq!(closes.get(), 1);
        assert_eq!(sink.frames_shown(), 3);
        assert!(!sink.stop_requested());
    }
}
