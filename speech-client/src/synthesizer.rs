use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Raw synthesized audio: 16-bit little-endian mono PCM at the synthesizer's sample rate
pub type AudioBytes = Vec<u8>;

/// Sample rate used when a provider does not say otherwise
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Output format tag for raw PCM16 audio
pub const FORMAT_PCM16: &str = "pcm16";

/// Everything besides the text that changes what a synthesizer produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    /// Voice identifier (provider default when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Speaking rate multiplier (1.0 = normal)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,

    /// Pitch shift (0.0 = unchanged)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,

    /// Output format tag
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_format() -> String {
    FORMAT_PCM16.to_string()
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            voice: None,
            rate: None,
            pitch: None,
            format: default_format(),
        }
    }
}

impl VoiceParams {
    /// Set the voice identifier.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Set the speaking rate.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = Some(rate.clamp(0.25, 4.0));
        self
    }

    /// Set the pitch shift.
    pub fn with_pitch(mut self, pitch: f64) -> Self {
        self.pitch = Some(pitch);
        self
    }
}

/// Trait for text-to-speech synthesizers
///
/// Synthesizers are slow (seconds per call) and stateful: `initialize` must
/// succeed once before the first `synthesize`.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Prepare the synthesizer (load models, check binaries, ...)
    async fn initialize(&self) -> Result<()>;

    /// Synthesize text into PCM16 mono audio at `sample_rate()`
    async fn synthesize(&self, text: &str) -> Result<AudioBytes>;

    /// Voice parameters applied to every request
    fn voice(&self) -> &VoiceParams;

    /// Sample rate of the produced audio
    fn sample_rate(&self) -> u32;

    /// Get the provider name for display
    fn name(&self) -> &'static str;
}
