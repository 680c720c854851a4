use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::io::{Cursor, ErrorKind};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{AudioEncoding, NarrationAudio};
use crate::error::PlaybackError;

/// Where automatically narrated clips are played.
pub trait AudioSink: Send + Sync {
    fn play(&self, audio: &NarrationAudio) -> Result<(), PlaybackError>;

    /// Best-effort halt of anything playing.
    fn stop_all(&self);
}

/// Decoded mono clip.
#[derive(Debug, Clone, PartialEq)]
pub struct Pcm {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode a WAV clip to mono f32, averaging channels.
pub fn decode_wav(bytes: &[u8]) -> Result<Pcm, PlaybackError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Ok(Pcm {
        samples: mix_to_mono(&interleaved, channels),
        sample_rate: spec.sample_rate,
    })
}

/// Decode an MP3 clip to mono f32. Corrupt frames are skipped.
pub fn decode_mp3(bytes: &[u8]) -> Result<Pcm, PlaybackError> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe().format(
        &hint,
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;
    let track = format.default_track().ok_or(PlaybackError::NoAudio)?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping corrupt MP3 frame: {e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend(mix_to_mono(buffer.samples(), spec.channels.count().max(1)));
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(PlaybackError::NoAudio);
    }
    Ok(Pcm { samples, sample_rate })
}

fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Plays clips on the default output device. Each `play` replaces whatever was
/// playing.
#[derive(Default)]
pub struct SpeakerSink {
    generation: Arc<AtomicU64>,
}

impl SpeakerSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for SpeakerSink {
    fn play(&self, audio: &NarrationAudio) -> Result<(), PlaybackError> {
        let pcm = match audio.encoding {
            AudioEncoding::Wav => decode_wav(&audio.bytes)?,
            AudioEncoding::Mp3 => decode_mp3(&audio.bytes)?,
        };

        let token = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let generation = self.generation.clone();
        std::thread::spawn(move || {
            if let Err(e) = play_blocking(pcm, token, generation) {
                log::warn!("Playback failed: {e}");
            }
        });
        Ok(())
    }

    fn stop_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

fn play_blocking(pcm: Pcm, token: u64, generation: Arc<AtomicU64>) -> Result<(), PlaybackError> {
    let host = cpal::default_host();
    let device = host.default_output_device().ok_or(PlaybackError::NoDevice)?;
    let config = device
        .default_output_config()
        .map_err(|e| PlaybackError::Output(e.to_string()))?;
    let output_rate = config.sample_rate() as f32;
    let channels = config.channels() as usize;

    // Nearest-sample resampling to the device rate
    let step = pcm.sample_rate as f32 / output_rate;
    let total = (pcm.samples.len() as f32 / step) as usize;

    let frame_idx = Arc::new(AtomicUsize::new(0));
    let frame_idx_clone = frame_idx.clone();
    let samples = Arc::new(pcm.samples);
    let samples_clone = samples.clone();

    let stream = device
        .build_output_stream(
            &config.into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut idx = frame_idx_clone.load(Ordering::Relaxed);
                for frame in data.chunks_mut(channels) {
                    let src = (idx as f32 * step) as usize;
                    let value = samples_clone.get(src).copied().unwrap_or(0.0);
                    for sample in frame.iter_mut() {
                        *sample = value;
                    }
                    idx += 1;
                }
                frame_idx_clone.store(idx, Ordering::Relaxed);
            },
            |err| log::error!("Audio output error: {err}"),
            None,
        )
        .map_err(|e| PlaybackError::Output(e.to_string()))?;

    stream.play().map_err(|e| PlaybackError::Output(e.to_string()))?;

    while frame_idx.load(Ordering::Relaxed) < total {
        if generation.load(Ordering::SeqCst) != token {
            log::debug!("Playback stopped");
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    drop(stream);
    Ok(())
}
