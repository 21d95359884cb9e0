//! `ffmpeg` / `ffplay` child processes fed raw RGB24 on stdin.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};

use image::imageops::{self, FilterType};
use image::RgbImage;

use super::{VideoEncoder, VideoSettings, Viewer};
use crate::error::{EncodeError, SinkError};

pub fn encoder_args(settings: VideoSettings, path: &Path) -> Vec<String> {
    let mut args = raw_input_args(settings);
    for arg in ["-c:v", "mjpeg", "-q:v", "3", "-pix_fmt", "yuvj420p", "-y"] {
        args.push(arg.to_string());
    }
    args.push(path.display().to_string());
    args
}

pub fn viewer_args(settings: VideoSettings, title: &str) -> Vec<String> {
    let mut args: Vec<String> = [
        "-loglevel",
        "error",
        "-fflags",
        "nobuffer",
        "-window_title",
        title,
        "-x",
        "800",
        "-y",
        "600",
        "-f",
        "rawvideo",
        "-pixel_format",
        "rgb24",
        "-video_size",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}x{}", settings.width, settings.height));
    args.push("-framerate".to_string());
    args.push(settings.fps.to_string());
    args.push("-".to_string());
    args
}

fn raw_input_args(settings: VideoSettings) -> Vec<String> {
    vec![
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-pixel_format".to_string(),
        "rgb24".to_string(),
        "-video_size".to_string(),
        format!("{}x{}", settings.width, settings.height),
        "-framerate".to_string(),
        settings.fps.to_string(),
        "-i".to_string(),
        "-".to_string(),
    ]
}

/// Put the child in its own process group so a terminal Ctrl-C reaches only
/// camfeed. Children are closed through stdin EOF during finalization.
fn detach_from_terminal(command: &mut Command) -> &mut Command {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    command
}

/// Scale to the fixed output geometry when the camera delivers another size.
fn fit<'a>(image: &'a RgbImage, settings: VideoSettings) -> std::borrow::Cow<'a, RgbImage> {
    if image.dimensions() == (settings.width, settings.height) {
        std::borrow::Cow::Borrowed(image)
    } else {
        std::borrow::Cow::Owned(imageops::resize(
            image,
            settings.width,
            settings.height,
            FilterType::Triangle,
        ))
    }
}

/// MJPEG-in-AVI encoder running as an `ffmpeg` child process.
pub struct FfmpegEncoder {
    path: PathBuf,
    settings: VideoSettings,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
}

impl FfmpegEncoder {
    pub fn spawn(path: &Path, settings: VideoSettings) -> Result<Self, SinkError> {
        let mut command = Command::new("ffmpeg");
        command
            .args(encoder_args(settings, path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        let mut child = detach_from_terminal(&mut command)
            .spawn()
            .map_err(|e| SinkError::Open {
                what: format!("ffmpeg encoder for {}", path.display()),
                reason: e.to_string(),
            })?;
        let stdin = child.stdin.take();
        log::info!(
            "recording {}x{}@{}fps to {}",
            settings.width,
            settings.height,
            settings.fps,
            path.display()
        );
        Ok(Self {
            path: path.to_path_buf(),
            settings,
            child: Some(child),
            stdin,
        })
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn write_frame(&mut self, seq: u64, image: &RgbImage) -> Result<(), EncodeError> {
        let stdin = self.stdin.as_mut().ok_or_else(|| EncodeError::Write {
            seq,
            reason: "encoder closed".to_string(),
        })?;
        let frame = fit(image, self.settings);
        if let Err(e) = stdin.write_all(frame.as_raw()) {
            if e.kind() == io::ErrorKind::BrokenPipe {
                // ffmpeg exited; further writes are pointless.
                self.stdin = None;
            }
            return Err(EncodeError::Write {
                seq,
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        // Closing stdin signals EOF so ffmpeg writes the AVI index.
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let status = child.wait()?;
            if !status.success() {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("ffmpeg exited with {}", status),
                ));
            }
        }
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.finish() {
                log::warn!("encoder for {} did not finish cleanly: {}", self.path.display(), e);
            }
        }
    }
}

/// `ffplay` window. Pressing `q`/`Esc` or closing it ends the process.
pub struct FfplayViewer {
    settings: VideoSettings,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    closed: bool,
}

impl FfplayViewer {
    pub fn spawn(settings: VideoSettings) -> Result<Self, SinkError> {
        let mut command = Command::new("ffplay");
        command
            .args(viewer_args(settings, "camfeed"))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let mut child = detach_from_terminal(&mut command)
            .spawn()
            .map_err(|e| SinkError::Open {
                what: "ffplay viewer".to_string(),
                reason: e.to_string(),
            })?;
        let stdin = child.stdin.take();
        log::info!("display window opened; press q in the window to stop");
        Ok(Self {
            settings,
            child: Some(child),
            stdin,
            closed: false,
        })
    }
}

impl Viewer for FfplayViewer {
    fn show(&mut self, image: &RgbImage) -> io::Result<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Ok(());
        };
        let frame = fit(image, self.settings);
        match stdin.write_all(frame.as_raw()) {
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                self.closed = true;
                self.stdin = None;
                Ok(())
            }
            other => other,
        }
    }

    fn closed(&mut self) -> bool {
        if !self.closed {
            if let Some(child) = self.child.as_mut() {
                if let Ok(Some(_)) = child.try_wait() {
                    self.closed = true;
                }
            }
        }
        self.closed
    }

    fn close(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            // The window may still be draining buffered frames.
            let _ = child.kill();
            let _ = child.wait();
        }
        self.closed = true;
    }
}

impl Drop for FfplayViewer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_args_describe_raw_input_and_mjpeg_output() {
        let args = encoder_args(VideoSettings::default(), Path::new("out.avi"));
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pixel_format rgb24 -video_size 1920x1080 -framerate 25 -i -"));
        assert!(joined.contains("-c:v mjpeg"));
        assert_eq!(args.last().map(String::as_str), Some("out.avi"));
    }

    #[test]
    fn viewer_reads_stdin() {
        let args = viewer_args(
            VideoSettings {
                fps: 10,
                width: 640,
                height: 360,
            },
            "cam",
        );
        assert_eq!(args.last().map(String::as_str), Some("-"));
        assert!(args.join(" ").contains("-video_size 640x360 -framerate 10"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn children_lead_their_own_process_group() {
        // Prints the shell's pid, then its process group id.
        let mut command = Command::new("sh");
        command
            .args(["-c", "echo $$; cut -d' ' -f5 /proc/$$/stat"])
            .stdout(Stdio::piped());
        let output = detach_from_terminal(&mut command).output().unwrap();
        let text = String::from_utf8_lossy(&output.stdout);
        let ids: Vec<&str> = text.lines().map(str::trim).collect();
        assert_eq!(ids.len(), 2, "unexpected output: {text}");
        assert_eq!(ids[0], ids[1]);
    }

    #[test]
    fn fit_resizes_only_when_needed() {
        let settings = VideoSettings {
            fps: 25,
            width: 8,
            height: 4,
        };
        let exact = RgbImage::new(8, 4);
        assert!(matches!(fit(&exact, settings), std::borrow::Cow::Borrowed(_)));
        let other = RgbImage::new(16, 16);
        assert_eq!(fit(&other, settings).dimensions(), (8, 4));
    }
}
