//! Text-to-speech clients for the readalong workspace
//!
//! Provides a unified interface over speech synthesizers:
//! - External command (piper and other CLI engines, subprocess)
//! - OpenAI-compatible `/audio/speech` APIs
//! - Mock synthesizer for tests and dry runs

pub mod audio;
pub mod config;
pub mod error;
pub mod providers;
pub mod synthesizer;

pub use config::{ProviderConfig, SpeechConfig};
pub use error::{Result, SynthError};
pub use providers::{MockSynthesizer, ProviderKind, get_synthesizer};
pub use synthesizer::{
    AudioBytes, DEFAULT_SAMPLE_RATE, FORMAT_PCM16, Synthesizer, VoiceParams,
};
