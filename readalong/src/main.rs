//! readalong - read a text file aloud, following along word by word

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use readalong::cache::{SynthesisCache, default_cache_dir};
use readalong::pipeline::SynthesisPipeline;
use readalong::playback::{AudioOutput, PlaybackEngine, VirtualOutput};
use readalong::text::{Document, FileSource, word_offset};
use readalong::{ReadalongConfig, ReadingSession, ReadingState, ReadingStatus};
use speech_client::{ProviderKind, get_synthesizer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Parser, Debug)]
#[command(name = "readalong")]
#[command(about = "Read text aloud with synthesized speech, following along word by word", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the text file
    file: Option<PathBuf>,

    /// Voice to use (provider specific)
    #[arg(long)]
    voice: Option<String>,

    /// Speaking rate multiplier (1.0 = normal)
    #[arg(long)]
    rate: Option<f64>,

    /// Pitch shift (0.0 = unchanged)
    #[arg(long)]
    pitch: Option<f64>,

    /// Start reading at this word (rounded back to its sentence)
    #[arg(long, default_value_t = 0)]
    from_word: usize,

    /// Do not open an audio device; play against a virtual clock
    #[arg(long, default_value_t = false)]
    silent: bool,

    /// Skip the synthesis cache
    #[arg(long, default_value_t = false)]
    no_cache: bool,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Synthesis cache management
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set default voice
    SetVoice {
        /// Voice identifier
        voice: String,
    },
    /// Set default speaking rate
    SetRate {
        /// Multiplier (0.25-4.0)
        value: f64,
    },
    /// Set default pitch shift
    SetPitch {
        /// Shift (-1.0-1.0)
        #[arg(allow_hyphen_values = true)]
        value: f64,
    },
    /// Set speech provider and optionally its model
    SetProvider {
        /// Provider (command, openai, mock)
        provider: String,
        /// Model for the provider
        #[arg(long)]
        model: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Delete all cached audio
    Clear,
    /// Print the cache directory
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    // Handle subcommands
    match &args.command {
        Some(Commands::Config { action }) => return handle_config_command(action),
        Some(Commands::Cache { action }) => return handle_cache_command(action),
        None => {}
    }

    let path = args
        .file
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Text file path is required. Run 'readalong --help' for usage."))?;

    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }

    let mut config = ReadalongConfig::load().context("Failed to load configuration")?;
    if args.voice.is_some() {
        config.voice = args.voice.clone();
    }
    if args.rate.is_some() {
        config.rate = args.rate;
    }
    if args.pitch.is_some() {
        config.pitch = args.pitch;
    }

    if args.debug {
        eprintln!("File: {}", path.display());
        eprintln!("Provider: {}", config.speech.provider);
        eprintln!("Voice: {:?}", config.voice_params());
    }

    let session = build_session(&path, &config, &args).await?;
    read_aloud(&session, args.from_word).await
}

async fn build_session(path: &PathBuf, config: &ReadalongConfig, args: &Args) -> Result<ReadingSession> {
    let synthesizer: Arc<dyn speech_client::Synthesizer> = Arc::from(
        get_synthesizer(&config.speech, config.voice_params(), config.sample_rate)
            .context("Failed to create synthesizer")?,
    );

    let cache = if args.no_cache {
        None
    } else {
        let cache =
            SynthesisCache::open(&cache_dir(config)?).context("Failed to open synthesis cache")?;
        log::debug!("Using synthesis cache at {}", cache.dir().display());
        Some(cache)
    };

    let source = FileSource::new(path, config.source_chunk_bytes);
    let document = Arc::new(Mutex::new(Document::new(
        Box::new(source),
        config.load_more_threshold,
    )));

    let output = open_output(args.silent, synthesizer.sample_rate())?;
    let engine = PlaybackEngine::new(output, config.crossfade_samples, config.poll_interval());
    let pipeline = SynthesisPipeline::new(
        document.clone(),
        synthesizer.clone(),
        cache,
        config.buffer_ahead,
    );

    eprintln!("Preparing {} synthesizer...", synthesizer.name());
    let session = ReadingSession::new(document, pipeline, engine);
    session
        .setup()
        .await
        .context("Failed to start the synthesizer")?;
    Ok(session)
}

#[cfg(feature = "speaker")]
fn open_output(silent: bool, sample_rate: u32) -> Result<Arc<dyn AudioOutput>> {
    if silent {
        return Ok(Arc::new(VirtualOutput::new(sample_rate)));
    }
    let speaker = readalong::playback::SpeakerOutput::open(sample_rate)
        .context("Failed to open the audio device")?;
    Ok(Arc::new(speaker))
}

#[cfg(not(feature = "speaker"))]
fn open_output(silent: bool, sample_rate: u32) -> Result<Arc<dyn AudioOutput>> {
    if !silent {
        eprintln!("Built without the `speaker` feature, playing silently");
    }
    Ok(Arc::new(VirtualOutput::new(sample_rate)))
}

fn cache_dir(config: &ReadalongConfig) -> Result<PathBuf> {
    match &config.cache_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(default_cache_dir()?),
    }
}

enum Outcome {
    Finished,
    Interrupted,
    Failed(String),
}

/// Read until the end of the text, an error, or Ctrl-C.
async fn read_aloud(session: &ReadingSession, from_word: usize) -> Result<()> {
    if from_word > 0 {
        session
            .seek(from_word)
            .await
            .context("Failed to load text")?;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));

    let mut rx = session.subscribe();
    session.toggle_auto_read().await;

    let mut text = session.text().await;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break Outcome::Finished;
                }
                let state = rx.borrow_and_update().clone();

                if word_offset(&text, state.current_word_index).is_none() {
                    text = session.text().await;
                }
                pb.set_message(progress_message(&text, &state));

                match state.status {
                    ReadingStatus::Restartable => break Outcome::Finished,
                    ReadingStatus::Idle => {
                        if let Some(error) = state.error_message {
                            break Outcome::Failed(error);
                        }
                    }
                    _ => {}
                }
            }
            _ = &mut ctrl_c => {
                session.cancel().await;
                break Outcome::Interrupted;
            }
        }
    };

    let last_word = session.state().current_word_index;
    match outcome {
        Outcome::Finished => {
            pb.finish_with_message("Done");
            Ok(())
        }
        Outcome::Interrupted => {
            pb.finish_with_message(format!(
                "Stopped at word {} (resume with --from-word {})",
                last_word, last_word
            ));
            Ok(())
        }
        Outcome::Failed(error) => {
            pb.abandon_with_message("Failed");
            anyhow::bail!("Reading stopped at word {}: {}", last_word, error)
        }
    }
}

fn progress_message(text: &str, state: &ReadingState) -> String {
    let word = word_offset(text, state.current_word_index)
        .and_then(|start| text[start..].split_whitespace().next())
        .unwrap_or("");

    match state.status {
        ReadingStatus::Loading => format!("word {} (synthesizing...)", state.current_word_index),
        ReadingStatus::Preparing => "preparing...".to_string(),
        _ => format!("word {}: {}", state.current_word_index, word),
    }
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = ReadalongConfig::load()?;
            println!("Configuration file: {:?}", ReadalongConfig::config_path()?);
            println!();
            println!("voice = {}", config.voice.as_deref().unwrap_or("(provider default)"));
            match config.rate {
                Some(rate) => println!("rate = {}", rate),
                None => println!("rate = (default)"),
            }
            match config.pitch {
                Some(pitch) => println!("pitch = {}", pitch),
                None => println!("pitch = (default)"),
            }
            println!("format = \"{}\"", config.format);
            println!("sample_rate = {}", config.sample_rate);
            println!("buffer_ahead = {}", config.buffer_ahead);
            match &config.cache_dir {
                Some(dir) => println!("cache_dir = \"{}\"", dir.display()),
                None => println!("cache_dir = (default)"),
            }
            println!();
            println!("[speech]");
            println!("provider = \"{}\"", config.speech.provider);
            println!("model = {}", config.speech.model.as_deref().unwrap_or("(none)"));
        }
        ConfigAction::SetVoice { voice } => {
            let mut config = ReadalongConfig::load()?;
            config.voice = Some(voice.clone());
            config.save()?;
            println!("Default voice set to: {}", voice);
        }
        ConfigAction::SetRate { value } => {
            let mut config = ReadalongConfig::load()?;
            config.rate = Some(value.clamp(0.25, 4.0));
            config.save()?;
            println!("Default rate set to: {}", value.clamp(0.25, 4.0));
        }
        ConfigAction::SetPitch { value } => {
            let mut config = ReadalongConfig::load()?;
            config.pitch = Some(value.clamp(-1.0, 1.0));
            config.save()?;
            println!("Default pitch set to: {}", value.clamp(-1.0, 1.0));
        }
        ConfigAction::SetProvider { provider, model } => {
            ProviderKind::from_str(provider)?;
            let mut config = ReadalongConfig::load()?;
            config.speech.provider = provider.clone();
            if model.is_some() {
                config.speech.model = model.clone();
            }
            config.save()?;
            println!("Provider set to: {}", provider);
        }
    }
    Ok(())
}

fn handle_cache_command(action: &CacheAction) -> Result<()> {
    let config = ReadalongConfig::load()?;
    let dir = cache_dir(&config)?;

    match action {
        CacheAction::Path => println!("{}", dir.display()),
        CacheAction::Clear => {
            let mut cache = SynthesisCache::open(&dir)?;
            let removed = cache.clear()?;
            println!("Removed {} cached file(s) from {}", removed, cache.dir().display());
        }
    }
    Ok(())
}
