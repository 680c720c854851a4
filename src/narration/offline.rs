use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{AudioEncoding, BackendKind, NarrationAudio, TtsBackend};
use crate::config::TtsConfig;
use crate::error::NarrationError;

/// espeak-ng (or a compatible CLI) writing WAV to a temporary file.
pub struct OfflineTts {
    command: String,
    voice: Option<String>,
    available: bool,
    temp_dir: Option<PathBuf>,
}

impl OfflineTts {
    /// Probe the configured executable once; a missing engine just marks the
    /// backend unavailable.
    pub fn new(config: &TtsConfig) -> Self {
        let available = std::process::Command::new(&config.offline_command)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false);

        if available {
            log::info!("Offline speech engine found: {}", config.offline_command);
        } else {
            log::info!("Offline speech engine '{}' not available", config.offline_command);
        }

        Self {
            command: config.offline_command.clone(),
            voice: config.offline_voice.clone(),
            available,
            temp_dir: None,
        }
    }

    /// Place intermediate WAV files in `dir` instead of the system temp dir.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    fn temp_file(&self) -> std::io::Result<tempfile::NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("obat-vision-").suffix(".wav");
        match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
    }
}

#[async_trait]
impl TtsBackend for OfflineTts {
    fn kind(&self) -> BackendKind {
        BackendKind::Offline
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn synthesize(&self, text: &str, language: &str) -> Result<NarrationAudio, NarrationError> {
        if !self.available {
            return Err(NarrationError::Unavailable(self.command.clone()));
        }
        if text.trim().is_empty() {
            return Err(NarrationError::EmptyText);
        }

        // Deleted when dropped, on every return path below.
        let wav = self.temp_file()?;
        let voice = self.voice.as_deref().unwrap_or(language);

        let mut child = Command::new(&self.command)
            .arg("-v")
            .arg(voice)
            .arg("-w")
            .arg(wav.path())
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| NarrationError::Offline(format!("failed to run {}: {e}", self.command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(NarrationError::Offline(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let bytes = tokio::fs::read(wav.path()).await?;
        if bytes.is_empty() {
            return Err(NarrationError::Offline(format!("{} produced no audio", self.command)));
        }

        Ok(NarrationAudio {
            bytes: Bytes::from(bytes),
            encoding: AudioEncoding::Wav,
            backend: BackendKind::Offline,
        })
    }
}
