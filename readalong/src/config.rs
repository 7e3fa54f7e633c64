//! readalong configuration management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use speech_client::{DEFAULT_SAMPLE_RATE, FORMAT_PCM16, SpeechConfig, VoiceParams};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::DEFAULT_BUFFER_AHEAD;
use crate::playback::DEFAULT_CROSSFADE_SAMPLES;
use crate::text::document::DEFAULT_LOAD_MORE_THRESHOLD;
use crate::text::source::DEFAULT_SOURCE_CHUNK_BYTES;

const DEFAULT_POLL_INTERVAL_MS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadalongConfig {
    /// Voice identifier passed to the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Speaking rate multiplier (1.0 = normal)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,

    /// Pitch shift (0.0 = unchanged)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,

    #[serde(default = "default_format")]
    pub format: String,

    /// Sample rate requested from the provider and used for playback
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Chunks synthesized ahead of playback
    #[serde(default = "default_buffer_ahead")]
    pub buffer_ahead: usize,

    /// Samples blended across chunk boundaries
    #[serde(default = "default_crossfade_samples")]
    pub crossfade_samples: usize,

    /// How often the spoken word is re-estimated
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Load more text when fewer chunks than this are ready
    #[serde(default = "default_load_more_threshold")]
    pub load_more_threshold: usize,

    /// Bytes read from the input file at a time
    #[serde(default = "default_source_chunk_bytes")]
    pub source_chunk_bytes: usize,

    /// Synthesis cache location. None means the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    #[serde(default)]
    pub speech: SpeechConfig,
}

fn default_format() -> String {
    FORMAT_PCM16.to_string()
}

fn default_sample_rate() -> u32 {
    DEFAULT_SAMPLE_RATE
}

fn default_buffer_ahead() -> usize {
    DEFAULT_BUFFER_AHEAD
}

fn default_crossfade_samples() -> usize {
    DEFAULT_CROSSFADE_SAMPLES
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_load_more_threshold() -> usize {
    DEFAULT_LOAD_MORE_THRESHOLD
}

fn default_source_chunk_bytes() -> usize {
    DEFAULT_SOURCE_CHUNK_BYTES
}

impl Default for ReadalongConfig {
    fn default() -> Self {
        Self {
            voice: None,
            rate: None,
            pitch: None,
            format: default_format(),
            sample_rate: default_sample_rate(),
            buffer_ahead: default_buffer_ahead(),
            crossfade_samples: default_crossfade_samples(),
            poll_interval_ms: default_poll_interval_ms(),
            load_more_threshold: default_load_more_threshold(),
            source_chunk_bytes: default_source_chunk_bytes(),
            cache_dir: None,
            speech: SpeechConfig::default(),
        }
    }
}

impl ReadalongConfig {
    /// Get the config file path: ~/.config/readalong/config.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("Neither HOME nor USERPROFILE is set")?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("readalong")
            .join("config.toml"))
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: ReadalongConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    /// Voice parameters sent with (and hashed into) every request.
    pub fn voice_params(&self) -> VoiceParams {
        VoiceParams {
            voice: self.voice.clone(),
            rate: self.rate,
            pitch: self.pitch,
            format: self.format.clone(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
