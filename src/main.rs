mod app;
mod classifier;
mod config;
mod error;
mod narration;
mod normalizer;
mod panel;
mod records;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use app::{Orchestrator, Settings, UserAction};
use classifier::ConfidenceGate;
use config::Config;
use narration::network::NetworkTts;
use narration::offline::OfflineTts;
use narration::player::SpeakerSink;
use narration::{NarrationEngine, TtsBackend};
use normalizer::ImageNormalizer;

const COMMANDS: &str = "Commands: submit <path> | capture <path> | camera on|off | play [file] | topic <name> | quit";

#[derive(Parser, Debug)]
#[command(name = "obat-vision", version, about = "Recognise medicine packages and read their details aloud")]
struct Args {
    /// ONNX model file
    #[arg(long)]
    model: Option<PathBuf>,

    /// CSV medicine table
    #[arg(long)]
    table: Option<PathBuf>,

    /// Label order of the model outputs, one per line
    #[arg(long)]
    label_map: Option<PathBuf>,

    /// Minimum confidence in [0, 1]
    #[arg(long)]
    threshold: Option<f32>,

    /// Never prefer the offline speech engine
    #[arg(long)]
    no_offline: bool,

    /// Write the merged configuration back to disk
    #[arg(long)]
    save_config: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.model {
            config.model_path = path.clone();
        }
        if let Some(path) = &self.table {
            config.table_path = path.clone();
        }
        if let Some(path) = &self.label_map {
            config.label_map_path = Some(path.clone());
        }
        if let Some(threshold) = self.threshold {
            config.confidence_threshold = threshold;
        }
        if self.no_offline {
            config.prefer_offline = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    log::info!("Obat Vision starting");

    let args = Args::parse();
    let mut config = Config::load();
    args.apply(&mut config);
    config.validate()?;

    if args.save_config {
        if let Err(e) = config.save() {
            log::warn!("Failed to save config: {e}");
        }
    }

    let catalog = match app::shared_catalog(&config).await {
        Ok(catalog) => catalog,
        Err(e) => {
            log::error!("Startup failed: {e}");
            return Err(e.into());
        }
    };

    let offline_config = config.tts.clone();
    let offline = tokio::task::spawn_blocking(move || OfflineTts::new(&offline_config)).await?;
    let backends: Vec<Arc<dyn TtsBackend>> = vec![
        Arc::new(NetworkTts::new(&config.tts)?) as Arc<dyn TtsBackend>,
        Arc::new(offline) as Arc<dyn TtsBackend>,
    ];
    let narrator = Arc::new(NarrationEngine::new(
        backends,
        Arc::new(SpeakerSink::new()),
        config.prefer_offline,
    ));

    let normalizer = ImageNormalizer::new(config.input_size, config.tensor_layout);
    log::info!(
        "Model input {0}x{0} ({1:?}), confidence threshold {2}",
        normalizer.size(),
        config.tensor_layout,
        config.confidence_threshold
    );

    let orchestrator = Orchestrator::new(
        catalog,
        normalizer,
        narrator,
        Settings {
            gate: ConfidenceGate::new(config.confidence_threshold),
            language: config.language.clone(),
            autoplay_topics: config.autoplay_topics,
        },
    );

    // Stdin is read on its own thread and fed through the channel.
    let (action_tx, action_rx) = async_channel::unbounded::<UserAction>();
    std::thread::spawn(move || read_actions(action_tx));

    println!("{COMMANDS}");
    app::run(orchestrator, action_rx).await;
    log::info!("Obat Vision stopped");
    Ok(())
}

fn read_actions(sender: async_channel::Sender<UserAction>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("Failed to read stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<UserAction>() {
            Ok(action) => {
                let quit = action == UserAction::Quit;
                if sender.send_blocking(action).is_err() || quit {
                    break;
                }
            }
            Err(e) => println!("{e}\n{COMMANDS}"),
        }
    }
}
