use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Result, SynthError};

/// Synthesizer selection and provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Provider identifier (command, openai, mock)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name/identifier for the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Provider-specific configuration
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "command".to_string()
}

/// Provider-specific configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key (optional, can use env var instead)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Custom base URL (for API providers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Program to run (for the command provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<PathBuf>,

    /// Arguments for the command provider; `{model}`, `{voice}` and `{rate}`
    /// are substituted per request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl SpeechConfig {
    /// Get provider config by provider name
    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.providers.get(provider)
    }

    /// Get the configured model, failing with a config error when it is required
    pub fn require_model(&self) -> Result<&str> {
        self.model.as_deref().ok_or_else(|| {
            SynthError::ConfigError(format!(
                "Provider '{}' needs a model. Set speech.model in the config file.",
                self.provider
            ))
        })
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            providers: HashMap::new(),
        }
    }
}
