use std::path::PathBuf;

use thiserror::Error;

/// Fatal: the model or the record table could not be brought up.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Model file not found: {0}")]
    ModelMissing(PathBuf),

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Record table not found: {0}")]
    TableMissing(PathBuf),

    #[error("Failed to read record table: {0}")]
    TableRead(String),

    #[error("Record table is empty")]
    TableEmpty,

    #[error("Duplicate label in record table: {0}")]
    DuplicateLabel(String),

    #[error("Label map is invalid: {0}")]
    LabelMap(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// The submitted image could not be turned into a tensor.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Unreadable image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Image has no pixels ({0}x{1})")]
    Empty(u32, u32),

    #[error("Failed to read image file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model returned {got} probabilities for {expected} labels")]
    OutputSize { expected: usize, got: usize },

    #[error("Model returned no usable probabilities")]
    EmptyOutput,
}

#[derive(Error, Debug)]
#[error("No record for label '{0}'")]
pub struct LookupError(pub String);

/// One backend's synthesis failure. Never propagated past the narration engine.
#[derive(Error, Debug)]
pub enum NarrationError {
    #[error("Nothing to narrate")]
    EmptyText,

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Network synthesis failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Synthesis service returned {0}")]
    Status(reqwest::StatusCode),

    #[error("Offline synthesis failed: {0}")]
    Offline(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("No output device found")]
    NoDevice,

    #[error("Invalid WAV data: {0}")]
    Wav(#[from] hound::Error),

    #[error("Invalid MP3 data: {0}")]
    Mp3(#[from] symphonia::core::errors::Error),

    #[error("Clip contains no audio")]
    NoAudio,

    #[error("Audio output error: {0}")]
    Output(String),
}

/// Request-scope failures of the recognition pipeline. Each one rejects the current
/// action only; the session keeps running.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to process image: {0}")]
    ImageProcessing(String),

    #[error(
        "Low confidence ({:.2}% < {:.2}%), please retake the photo",
        .confidence * 100.0,
        .threshold * 100.0
    )]
    LowConfidence { confidence: f32, threshold: f32 },

    #[error(transparent)]
    RecordNotFound(#[from] LookupError),

    #[error("No medicine recognised yet, submit an image first")]
    NoRecord,

    #[error("Live capture is disabled, enable the camera first")]
    CaptureDisabled,
}

impl From<ImageError> for PipelineError {
    fn from(err: ImageError) -> Self {
        PipelineError::ImageProcessing(err.to_string())
    }
}

impl From<ClassifyError> for PipelineError {
    fn from(err: ClassifyError) -> Self {
        PipelineError::ImageProcessing(err.to_string())
    }
}
