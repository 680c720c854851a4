use std::path::Path;

use super::pipeline::{Orchestrator, TopicView};
use super::state::{Recognition, UserAction};
use crate::error::{ImageError, PipelineError};
use crate::narration::Narration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Consume actions until the sender closes or the user quits. Each action runs to
/// completion before the next is received.
pub async fn run(mut orchestrator: Orchestrator, actions: async_channel::Receiver<UserAction>) {
    while let Ok(action) = actions.recv().await {
        if handle_action(&mut orchestrator, action).await == Flow::Quit {
            break;
        }
    }
    orchestrator.narrator().stop_all();
    log::info!("Action loop finished");
}

/// Handle one user action. This is the core state machine.
pub async fn handle_action(orchestrator: &mut Orchestrator, action: UserAction) -> Flow {
    match action {
        UserAction::Submit { path, source } => {
            let result = match read_image(&path).await {
                Ok(bytes) => orchestrator.submit_image(bytes, source).await,
                Err(e) => Err(orchestrator.reject(e)),
            };
            match result {
                Ok(recognition) => println!("{}", describe_recognition(&recognition)),
                Err(e) => report(&e),
            }
        }
        UserAction::SetCamera(enabled) => {
            orchestrator.set_live_capture(enabled);
            println!("Camera {}", if enabled { "on" } else { "off" });
        }
        UserAction::PlaySummary(save_to) => match orchestrator.play_summary().await {
            Ok(narration) => play_or_save(orchestrator, narration, save_to.as_deref()).await,
            Err(e) => report(&e),
        },
        UserAction::SelectTopic(topic) => match orchestrator.select_topic(topic).await {
            Ok(view) => println!("{}", describe_topic(&view)),
            Err(e) => report(&e),
        },
        UserAction::Quit => return Flow::Quit,
    }
    Flow::Continue
}

async fn read_image(path: &Path) -> Result<Vec<u8>, PipelineError> {
    let bytes = tokio::fs::read(path).await.map_err(ImageError::from)?;
    log::debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(bytes)
}

async fn play_or_save(orchestrator: &Orchestrator, mut narration: Narration, save_to: Option<&Path>) {
    let Some(audio) = &narration.audio else {
        println!("{}", describe_narration(&narration));
        return;
    };

    if let Some(path) = save_to {
        match tokio::fs::write(path, &audio.bytes).await {
            Ok(()) => println!("Saved {} audio to {}", audio.encoding.name(), path.display()),
            Err(e) => {
                log::warn!("Failed to save audio: {e}");
                println!("Error: failed to save audio to {}: {e}", path.display());
            }
        }
        return;
    }

    if let Err(e) = orchestrator.narrator().play(audio) {
        log::warn!("Playback failed: {e}");
        println!("{e}; use `play <file>` to save the clip instead");
    } else {
        narration.played = true;
    }
    println!("{}", describe_narration(&narration));
}

fn report(err: &PipelineError) {
    log::warn!("Action rejected: {err}");
    println!("Error: {err}");
}

pub fn describe_recognition(recognition: &Recognition) -> String {
    let (w, h) = recognition.display.dimensions();
    format!(
        "{} ({w}x{h})\nConfidence: {}\n{}",
        recognition.caption,
        recognition.confidence_percent(),
        recognition.summary
    )
}

pub fn describe_narration(narration: &Narration) -> String {
    match &narration.audio {
        Some(audio) => format!(
            "Audio: {} bytes {} via {} backend, {}",
            audio.bytes.len(),
            audio.encoding.name(),
            audio.backend,
            if narration.played { "played" } else { "not played" }
        ),
        None if narration.failures.is_empty() => "Audio: none".to_string(),
        None => {
            let reasons: Vec<String> = narration
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.backend, f.error))
                .collect();
            format!("Audio unavailable ({})", reasons.join("; "))
        }
    }
}

pub fn describe_topic(view: &TopicView) -> String {
    let Some(detail) = &view.detail else {
        return "Detail panel closed".to_string();
    };
    let mut out = format!("{}\n{}", detail.title, detail.text);
    if let Some(narration) = &view.narration {
        out.push('\n');
        out.push_str(&describe_narration(narration));
    }
    out
}
