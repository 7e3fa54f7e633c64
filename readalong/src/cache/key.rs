use sha2::{Digest, Sha256};
use speech_client::VoiceParams;
use std::fmt;

const DEFAULT_VOICE: &str = "defaultVoice";
const DEFAULT_RATE: f64 = 1.0;
const DEFAULT_PITCH: f64 = 0.0;

/// Content fingerprint of one synthesis request.
///
/// Two requests with the same key are treated as identical. Rate and pitch
/// are compared at three decimal places. The sample rate is part of the
/// format tag, so audio rendered at another rate is never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(text: &str, voice: &VoiceParams, sample_rate: u32) -> Self {
        let digest = Sha256::digest(canonical_request(text, voice, sample_rate).as_bytes());
        Self(format!("{:x}", digest))
    }

    /// Lowercase hex SHA-256 digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The string that gets hashed. Field order is fixed.
pub fn canonical_request(text: &str, voice: &VoiceParams, sample_rate: u32) -> String {
    format!(
        "v={}|r={}|p={}|fmt={}@{}|text={}",
        voice.voice.as_deref().unwrap_or(DEFAULT_VOICE),
        fixed3(voice.rate.unwrap_or(DEFAULT_RATE)),
        fixed3(voice.pitch.unwrap_or(DEFAULT_PITCH)),
        voice.format,
        sample_rate,
        text
    )
}

fn fixed3(value: f64) -> String {
    let s = format!("{:.3}", value);
    // -0.0001 and 0.0 should not differ
    if s == "-0.000" { "0.000".to_string() } else { s }
}
