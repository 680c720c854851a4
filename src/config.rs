use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::error::StartupError;

/// Memory layout of the model input tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// [1, H, W, 3], the Keras default
    Nhwc,
    /// [1, 3, H, W]
    Nchw,
}

/// Speech synthesis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Google Translate TTS endpoint
    pub endpoint: String,
    pub timeout_secs: u64,
    /// Executable of the offline engine
    pub offline_command: String,
    /// espeak-ng voice; falls back to the narration language
    pub offline_voice: Option<String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://translate.google.com/translate_tts".into(),
            timeout_secs: 10,
            offline_command: "espeak-ng".into(),
            offline_voice: None,
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model_path: PathBuf,
    pub table_path: PathBuf,
    /// One label per line, in model output order. Without it the sorted table
    /// labels are used.
    pub label_map_path: Option<PathBuf>,
    pub confidence_threshold: f32,
    pub input_size: u32,
    pub tensor_layout: TensorLayout,
    pub language: String,
    /// Narrate a topic as soon as it is opened.
    pub autoplay_topics: bool,
    /// Try the offline engine first for automatic narration.
    pub prefer_offline: bool,
    pub tts: TtsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model_obat.onnx"),
            table_path: PathBuf::from("dataset_obat.csv"),
            label_map_path: None,
            confidence_threshold: 0.0,
            input_size: 256,
            tensor_layout: TensorLayout::Nhwc,
            language: "id".into(),
            autoplay_topics: true,
            prefer_offline: true,
            tts: TtsConfig::default(),
        }
    }
}

impl Config {
    /// Directory: ~/.config/obat-vision/
    fn dir() -> PathBuf {
        let mut p = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        p.push("obat-vision");
        p
    }

    fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load from disk, returning defaults if file doesn't exist or is invalid.
    pub fn load() -> Self {
        let path = Self::path();
        match fs::read_to_string(&path) {
            Ok(data) => Self::from_json(&data),
            Err(_) => Self::default(),
        }
    }

    fn from_json(data: &str) -> Self {
        serde_json::from_str(data).unwrap_or_else(|e| {
            log::warn!("Ignoring invalid config: {e}");
            Self::default()
        })
    }

    /// Persist to disk.
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let dir = Self::dir();
        fs::create_dir_all(&dir)?;
        let data = serde_json::to_string_pretty(self)?;
        fs::write(Self::path(), data)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), StartupError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(StartupError::Config(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        if self.input_size == 0 {
            return Err(StartupError::Config("input_size must be positive".into()));
        }
        if self.language.trim().is_empty() {
            return Err(StartupError::Config("language must not be empty".into()));
        }
        Ok(())
    }
}
