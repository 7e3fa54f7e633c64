//! OpenAI-compatible speech API provider
//!
//! Used for services that implement `POST /audio/speech`:
//! - OpenAI
//! - Self-hosted servers (kokoro-fastapi, openedai-speech, ...)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthError};
use crate::synthesizer::{AudioBytes, Synthesizer, VoiceParams};

const DEFAULT_VOICE: &str = "alloy";

/// Provider for OpenAI-compatible speech APIs
pub struct OpenAICompatibleSynthesizer {
    model: String,
    base_url: String,
    api_key: String,
    voice: VoiceParams,
    sample_rate: u32,
    client: Client,
}

impl OpenAICompatibleSynthesizer {
    /// Create a new OpenAI-compatible provider
    pub fn new(
        model: &str,
        base_url: &str,
        api_key: String,
        voice: VoiceParams,
        sample_rate: u32,
    ) -> Result<Self> {
        Ok(Self {
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            voice,
            sample_rate,
            client: Client::new(),
        })
    }

    /// Create a provider pointed at api.openai.com
    pub fn openai(model: &str, api_key: String, voice: VoiceParams) -> Result<Self> {
        // The hosted API always returns 24 kHz mono for response_format=pcm
        Self::new(model, "https://api.openai.com/v1", api_key, voice, 24_000)
    }

    fn request_body(&self, text: &str) -> SpeechRequest {
        SpeechRequest {
            model: self.model.clone(),
            input: text.to_string(),
            voice: self
                .voice
                .voice
                .clone()
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            response_format: "pcm",
            speed: self.voice.rate,
        }
    }
}

// OpenAI API request/response types

#[derive(Debug, Serialize)]
struct SpeechRequest {
    model: String,
    input: String,
    voice: String,
    response_format: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[async_trait]
impl Synthesizer for OpenAICompatibleSynthesizer {
    async fn initialize(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(SynthError::ProviderUnavailable(
                "Empty API key for speech provider".into(),
            ));
        }
        Ok(())
    }

    async fn synthesize(&self, text: &str) -> Result<AudioBytes> {
        let url = format!("{}/audio/speech", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(text))
            .send()
            .await
            .map_err(|e| SynthError::ApiError {
                message: format!("Request failed: {}", e),
                status_code: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message =
                if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                    error_response.error.message
                } else {
                    error_text
                };

            return Err(SynthError::ApiError {
                message,
                status_code: Some(status.as_u16()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| SynthError::ApiError {
            message: format!("Failed to read audio: {}", e),
            status_code: None,
        })?;

        if bytes.len() % 2 != 0 {
            return Err(SynthError::InvalidAudio(format!(
                "Odd byte count ({}) for PCM16 response",
                bytes.len()
            )));
        }

        Ok(bytes.to_vec())
    }

    fn voice(&self) -> &VoiceParams {
        &self.voice
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &'static str {
        "OpenAI-compatible"
    }
}
