//! Speech synthesizer implementations

mod command;
pub mod mock;
mod openai_compatible;

pub use command::CommandSynthesizer;
pub use mock::MockSynthesizer;
pub use openai_compatible::OpenAICompatibleSynthesizer;

use crate::config::{ProviderConfig, SpeechConfig};
use crate::error::{Result, SynthError};
use crate::synthesizer::{Synthesizer, VoiceParams};

/// Supported provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Command,
    OpenAi,
    Mock,
}

impl ProviderKind {
    /// Parse provider kind from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "command" | "cmd" | "piper" => Ok(Self::Command),
            "openai" | "openai-compatible" | "openai_compatible" => Ok(Self::OpenAi),
            "mock" => Ok(Self::Mock),
            _ => Err(SynthError::ConfigError(format!("Unknown provider: {}", s))),
        }
    }

    /// Get the environment variable name for this provider's API key
    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            Self::Command | Self::Mock => None,
            Self::OpenAi => Some("OPENAI_API_KEY"),
        }
    }
}

/// Create a synthesizer from the speech config
pub fn get_synthesizer(
    config: &SpeechConfig,
    voice: VoiceParams,
    sample_rate: u32,
) -> Result<Box<dyn Synthesizer>> {
    let kind = ProviderKind::from_str(&config.provider)?;
    let provider_config = config.get_provider_config(&config.provider);

    match kind {
        ProviderKind::Command => {
            let (command, args) = provider_config
                .map(|c| (c.command.clone(), c.args.clone()))
                .unwrap_or_default();
            // Empty args means the default template, which passes {model}
            let model = if args.is_empty() || args.iter().any(|a| a.contains("{model}")) {
                config.require_model()?
            } else {
                config.model.as_deref().unwrap_or("")
            };
            Ok(Box::new(CommandSynthesizer::new(
                command,
                args,
                model,
                voice,
                sample_rate,
            )?))
        }
        ProviderKind::OpenAi => {
            let api_key = get_api_key(provider_config, kind, "OpenAI")?;
            let model = config.model.as_deref().unwrap_or("tts-1");
            match provider_config.and_then(|c| c.base_url.as_deref()) {
                Some(base_url) => Ok(Box::new(OpenAICompatibleSynthesizer::new(
                    model,
                    base_url,
                    api_key,
                    voice,
                    sample_rate,
                )?)),
                None => Ok(Box::new(OpenAICompatibleSynthesizer::openai(
                    model, api_key, voice,
                )?)),
            }
        }
        ProviderKind::Mock => Ok(Box::new(
            MockSynthesizer::always_succeeds()
                .with_voice(voice)
                .with_sample_rate(sample_rate),
        )),
    }
}

/// Get API key from config or the provider's environment variable
fn get_api_key(
    config: Option<&ProviderConfig>,
    kind: ProviderKind,
    provider_name: &str,
) -> Result<String> {
    if let Some(key) = config.and_then(|c| c.api_key.clone()) {
        return Ok(key);
    }

    let env_var = kind.env_var().ok_or_else(|| {
        SynthError::ConfigError(format!("{} does not take an API key", provider_name))
    })?;
    std::env::var(env_var).map_err(|_| SynthError::MissingApiKey {
        provider: provider_name.to_string(),
        env_var: env_var.to_string(),
    })
}
