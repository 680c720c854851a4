use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use image::RgbImage;

use crate::classifier::Classification;
use crate::panel::{DetailTopic, PanelState};
use crate::records::MedicineRecord;

/// User actions, processed one at a time by the action loop.
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    Submit { path: PathBuf, source: ImageSource },
    SetCamera(bool),
    /// Manual summary playback, optionally saving the clip.
    PlaySummary(Option<PathBuf>),
    SelectTopic(DetailTopic),
    Quit,
}

/// Where a submitted image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Upload,
    Capture,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseActionError(pub String);

impl fmt::Display for ParseActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParseActionError {}

impl FromStr for UserAction {
    type Err = ParseActionError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        let path = |what: &str| {
            if rest.is_empty() {
                Err(ParseActionError(format!("usage: {what} <path>")))
            } else {
                Ok(PathBuf::from(rest))
            }
        };

        match command.to_ascii_lowercase().as_str() {
            "submit" | "upload" => Ok(UserAction::Submit {
                path: path("submit")?,
                source: ImageSource::Upload,
            }),
            "capture" => Ok(UserAction::Submit {
                path: path("capture")?,
                source: ImageSource::Capture,
            }),
            "camera" => match rest {
                "on" => Ok(UserAction::SetCamera(true)),
                "off" => Ok(UserAction::SetCamera(false)),
                _ => Err(ParseActionError("usage: camera on|off".into())),
            },
            "play" => Ok(UserAction::PlaySummary(
                (!rest.is_empty()).then(|| PathBuf::from(rest)),
            )),
            "topic" => rest
                .parse()
                .map(UserAction::SelectTopic)
                .map_err(|e| ParseActionError(e.to_string())),
            "quit" | "exit" => Ok(UserAction::Quit),
            "" => Err(ParseActionError("empty command".into())),
            other => Err(ParseActionError(format!("unknown command '{other}'"))),
        }
    }
}

/// An accepted submission, kept until the next one.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub classification: Classification,
    pub record: MedicineRecord,
    pub caption: String,
    pub summary: String,
    pub display: RgbImage,
}

impl Recognition {
    pub fn confidence_percent(&self) -> String {
        self.classification.confidence_percent()
    }
}

/// Per-session mutable state owned by the orchestrator.
#[derive(Debug, Default)]
pub struct Session {
    pub panel: PanelState,
    pub current: Option<Recognition>,
    pub live_capture: bool,
}

impl Session {
    /// Drop the shown result and close any open topic.
    pub fn clear_result(&mut self) {
        self.current = None;
        self.panel.reset();
    }
}
