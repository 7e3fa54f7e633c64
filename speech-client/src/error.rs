use thiserror::Error;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error(
        "API key not found for {provider}. Set {env_var} environment variable or add to config."
    )]
    MissingApiKey { provider: String, env_var: String },

    #[error("Provider not available: {0}")]
    ProviderUnavailable(String),

    #[error("Synthesizer used before initialize()")]
    NotInitialized,

    #[error("API error{}: {message}", status_code.map(|c| format!(" (HTTP {})", c)).unwrap_or_default())]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Synthesis command failed: {0}")]
    CommandError(String),

    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SynthError>;
