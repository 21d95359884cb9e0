//! Selectors that fill in a camera id or record length the operator left out.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use crate::directory::CameraDescriptor;
use crate::error::ConfigError;
use crate::session::Selector;

/// Numbered-list prompt on a line-oriented terminal.
///
/// Input and output are generic so the prompt can be driven from a buffer.
pub struct PromptSelector<R, W> {
    input: R,
    output: W,
}

impl PromptSelector<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> PromptSelector<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, prompt: &str) -> Result<String, ConfigError> {
        write!(self.output, "{}", prompt).map_err(prompt_failed)?;
        self.output.flush().map_err(prompt_failed)?;
        let mut line = String::new();
        let read = self.input.read_line(&mut line).map_err(prompt_failed)?;
        if read == 0 {
            return Err(ConfigError::SelectionAborted("input closed".into()));
        }
        Ok(line.trim().to_string())
    }
}

fn prompt_failed(err: io::Error) -> ConfigError {
    ConfigError::SelectionAborted(format!("prompt failed: {}", err))
}

impl<R: BufRead, W: Write> Selector for PromptSelector<R, W> {
    fn select_camera(&mut self, cameras: &[CameraDescriptor]) -> Result<String, ConfigError> {
        writeln!(self.output, "Available cameras:").map_err(prompt_failed)?;
        for (index, camera) in cameras.iter().enumerate() {
            writeln!(self.output, "  {:>3}) {}", index + 1, camera).map_err(prompt_failed)?;
        }
        loop {
            let answer = self.ask("Camera (number or id): ")?;
            if answer.is_empty() {
                continue;
            }
            if let Some(camera) = cameras.iter().find(|camera| camera.id == answer) {
                return Ok(camera.id.clone());
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=cameras.len()).contains(&n) => return Ok(cameras[n - 1].id.clone()),
                _ => {
                    writeln!(self.output, "'{}' is not in the list", answer).map_err(prompt_failed)?;
                }
            }
        }
    }

    fn select_duration(&mut self, default: Duration) -> Result<Duration, ConfigError> {
        let prompt = format!("Record length in seconds [{}]: ", default.as_secs_f64());
        loop {
            let answer = self.ask(&prompt)?;
            if answer.is_empty() {
                return Ok(default);
            }
            match answer.parse::<f64>() {
                Ok(secs) if secs.is_finite() && secs > 0.0 => {
                    return Ok(Duration::from_secs_f64(secs));
                }
                _ => {
                    writeln!(self.output, "enter a positive number of seconds")
                        .map_err(prompt_failed)?;
                }
            }
        }
    }
}

/// Selector with values fixed up front; missing values are errors.
#[derive(Clone, Debug, Default)]
pub struct FixedSelector {
    pub camera_id: Option<String>,
    pub record_length: Option<Duration>,
    pub calls: usize,
}

impl FixedSelector {
    pub fn new(camera_id: impl Into<String>, record_length: Duration) -> Self {
        Self {
            camera_id: Some(camera_id.into()),
            record_length: Some(record_length),
            calls: 0,
        }
    }
}

impl Selector for FixedSelector {
    fn select_camera(&mut self, _cameras: &[CameraDescriptor]) -> Result<String, ConfigError> {
        self.calls += 1;
        self.camera_id
            .clone()
            .ok_or_else(|| ConfigError::SelectionAborted("no camera id".into()))
    }

    fn select_duration(&mut self, _default: Duration) -> Result<Duration, ConfigError> {
        self.calls += 1;
        self.record_length
            .ok_or_else(|| ConfigError::SelectionAborted("no record length".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn cameras() -> Vec<CameraDescriptor> {
        vec![
            CameraDescriptor {
                id: "7".into(),
                name: "Harbour".into(),
            },
            CameraDescriptor {
                id: "42".into(),
                name: "Bridge".into(),
            },
        ]
    }

    #[test]
    fn picks_camera_by_list_number() {
        let mut out = Vec::new();
        let mut selector = PromptSelector::new(Cursor::new("2\n"), &mut out);
        assert_eq!(selector.select_camera(&cameras()).unwrap(), "42");
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("1) Harbour (id 7)"));
    }

    #[test]
    fn id_match_wins_over_list_number() {
        let mut selector = PromptSelector::new(Cursor::new("7\n"), Vec::new());
        assert_eq!(selector.select_camera(&cameras()).unwrap(), "7");
    }

    #[test]
    fn reprompts_after_invalid_choice() {
        let mut selector = PromptSelector::new(Cursor::new("9\n\n1\n"), Vec::new());
        assert_eq!(selector.select_camera(&cameras()).unwrap(), "7");
    }

    #[test]
    fn empty_duration_takes_default() {
        let mut selector = PromptSelector::new(Cursor::new("\n"), Vec::new());
        let length = selector.select_duration(Duration::from_secs(10)).unwrap();
        assert_eq!(length, Duration::from_secs(10));
    }

    #[test]
    fn rejects_non_positive_duration() {
        let mut selector = PromptSelector::new(Cursor::new("-3\nabc\n2.5\n"), Vec::new());
        let length = selector.select_duration(Duration::from_secs(10)).unwrap();
        assert_eq!(length, Duration::from_millis(2500));
    }

    #[test]
    fn closed_input_aborts() {
        let mut selector = PromptSelector::new(Cursor::new(""), Vec::new());
        let err = selector.select_camera(&cameras()).unwrap_err();
        assert!(matches!(err, ConfigError::SelectionAborted(_)));
    }
}
