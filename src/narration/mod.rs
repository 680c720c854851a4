//! Text to speech with an ordered backend fallback.

pub mod network;
pub mod offline;
pub mod player;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{NarrationError, PlaybackError};
use player::AudioSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Remote synthesis service
    Network,
    /// Local speech engine, may be missing on the host
    Offline,
}

impl BackendKind {
    pub fn alternate(self) -> Self {
        match self {
            BackendKind::Network => BackendKind::Offline,
            BackendKind::Offline => BackendKind::Network,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Network => f.write_str("network"),
            BackendKind::Offline => f.write_str("offline"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    Mp3,
    Wav,
}

impl AudioEncoding {
    pub fn name(self) -> &'static str {
        match self {
            AudioEncoding::Mp3 => "mp3",
            AudioEncoding::Wav => "wav",
        }
    }
}

/// One synthesized clip.
#[derive(Debug, Clone)]
pub struct NarrationAudio {
    pub bytes: Bytes,
    pub encoding: AudioEncoding,
    pub backend: BackendKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Triggered by the app and played immediately
    Auto,
    /// Triggered by the user, who gets player controls
    Manual,
}

#[derive(Debug, Clone)]
pub struct NarrationRequest {
    pub text: String,
    pub language: String,
    pub mode: PlaybackMode,
    /// Overrides the mode-based choice of first backend.
    pub preferred: Option<BackendKind>,
}

impl NarrationRequest {
    pub fn new(text: impl Into<String>, language: impl Into<String>, mode: PlaybackMode) -> Self {
        Self {
            text: text.into(),
            language: language.into(),
            mode,
            preferred: None,
        }
    }
}

#[async_trait]
pub trait TtsBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether the backend can be tried at all on this host.
    fn is_available(&self) -> bool;

    async fn synthesize(&self, text: &str, language: &str) -> Result<NarrationAudio, NarrationError>;
}

#[derive(Debug)]
pub struct BackendFailure {
    pub backend: BackendKind,
    pub error: NarrationError,
}

/// Result of a narration call. Failures are reported here and never raised.
#[derive(Debug, Default)]
pub struct Narration {
    pub audio: Option<NarrationAudio>,
    pub failures: Vec<BackendFailure>,
    /// Whether the clip reached the output sink.
    pub played: bool,
}

impl Narration {
    pub fn is_silent(&self) -> bool {
        self.audio.is_none()
    }
}

pub struct NarrationEngine {
    backends: Vec<Arc<dyn TtsBackend>>,
    sink: Arc<dyn AudioSink>,
    prefer_offline: bool,
}

impl NarrationEngine {
    pub fn new(backends: Vec<Arc<dyn TtsBackend>>, sink: Arc<dyn AudioSink>, prefer_offline: bool) -> Self {
        Self {
            backends,
            sink,
            prefer_offline,
        }
    }

    fn backend(&self, kind: BackendKind) -> Option<&Arc<dyn TtsBackend>> {
        self.backends
            .iter()
            .find(|b| b.kind() == kind && b.is_available())
    }

    /// First choice for a request: explicit preference, else offline for automatic
    /// narration when it is installed and preferred, else network.
    pub fn preferred_backend(&self, request: &NarrationRequest) -> BackendKind {
        if let Some(kind) = request.preferred {
            return kind;
        }
        match request.mode {
            PlaybackMode::Auto if self.prefer_offline && self.backend(BackendKind::Offline).is_some() => {
                BackendKind::Offline
            }
            _ => BackendKind::Network,
        }
    }

    /// Backends to try, in order: the preferred one, then its alternate once.
    pub fn backend_order(&self, request: &NarrationRequest) -> Vec<&Arc<dyn TtsBackend>> {
        let first = self.preferred_backend(request);
        [first, first.alternate()]
            .into_iter()
            .filter_map(|kind| self.backend(kind))
            .collect()
    }

    /// Synthesize `request.text`. Automatic requests are played right away; manual
    /// ones are handed back for the caller's player.
    pub async fn narrate(&self, request: &NarrationRequest) -> Narration {
        let mut narration = Narration::default();
        if request.text.trim().is_empty() {
            log::debug!("Skipping narration of empty text");
            return narration;
        }

        for backend in self.backend_order(request) {
            let kind = backend.kind();
            match backend.synthesize(&request.text, &request.language).await {
                Ok(audio) => {
                    log::info!(
                        "Narrated {} chars via {kind} backend ({} bytes {})",
                        request.text.chars().count(),
                        audio.bytes.len(),
                        audio.encoding.name()
                    );
                    narration.audio = Some(audio);
                    break;
                }
                Err(error) => {
                    log::warn!("Narration via {kind} backend failed: {error}");
                    narration.failures.push(BackendFailure { backend: kind, error });
                }
            }
        }

        if narration.is_silent() {
            log::warn!("Narration unavailable, continuing without audio");
        }

        if let (PlaybackMode::Auto, Some(audio)) = (request.mode, &narration.audio) {
            match self.play(audio) {
                Ok(()) => narration.played = true,
                Err(e) => log::warn!("Playback of {} clip failed: {e}", audio.encoding.name()),
            }
        }
        narration
    }

    /// Send a clip to the output sink, replacing whatever is playing.
    pub fn play(&self, audio: &NarrationAudio) -> Result<(), PlaybackError> {
        self.sink.play(audio)
    }

    /// Halt whatever is playing. Synthesis already in progress is not cancelled.
    pub fn stop_all(&self) {
        self.sink.stop_all();
    }
}
