//! External command provider
//!
//! Runs a local TTS engine (piper, espeak-ng, ...) as a subprocess. The text
//! is written to stdin; stdout carries either raw PCM16 or a WAV file.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::audio;
use crate::error::{Result, SynthError};
use crate::synthesizer::{AudioBytes, Synthesizer, VoiceParams};

/// Provider that pipes text through an external TTS program
pub struct CommandSynthesizer {
    program: PathBuf,
    args: Vec<String>,
    model: String,
    voice: VoiceParams,
    sample_rate: u32,
    initialized: AtomicBool,
}

impl CommandSynthesizer {
    /// Create a new command provider
    ///
    /// Returns an error if the program is not found.
    pub fn new(
        program: Option<PathBuf>,
        args: Vec<String>,
        model: &str,
        voice: VoiceParams,
        sample_rate: u32,
    ) -> Result<Self> {
        let program = match program {
            Some(path) if path.components().count() > 1 => {
                if !path.exists() {
                    return Err(SynthError::ProviderUnavailable(format!(
                        "TTS command not found at specified path: {}",
                        path.display()
                    )));
                }
                path
            }
            Some(name) => which::which(&name).map_err(|_| {
                SynthError::ProviderUnavailable(format!(
                    "TTS command '{}' not found in PATH",
                    name.display()
                ))
            })?,
            None => which::which("piper").map_err(|_| {
                SynthError::ProviderUnavailable(
                    "piper not found. Install it or set providers.command.command in the config"
                        .into(),
                )
            })?,
        };

        let args = if args.is_empty() {
            vec![
                "--model".to_string(),
                "{model}".to_string(),
                "--output-raw".to_string(),
            ]
        } else {
            args
        };

        Ok(Self {
            program,
            args,
            model: model.to_string(),
            voice,
            sample_rate,
            initialized: AtomicBool::new(false),
        })
    }

    /// Turn the program's stdout into PCM16 at `sample_rate`.
    ///
    /// WAV output at another rate is resampled; raw output has no header and
    /// is taken to already be at `sample_rate`.
    fn decode_output(&self, stdout: Vec<u8>) -> Result<AudioBytes> {
        if audio::is_wav(&stdout) {
            let (pcm, rate) = audio::wav_to_pcm16(&stdout)?;
            if rate != self.sample_rate {
                log::debug!("Resampling TTS output from {} Hz to {} Hz", rate, self.sample_rate);
                return audio::resample_pcm16(&pcm, rate, self.sample_rate);
            }
            return Ok(pcm);
        }

        if stdout.len() % 2 != 0 {
            return Err(SynthError::InvalidAudio(format!(
                "Odd byte count ({}) for PCM16 output",
                stdout.len()
            )));
        }

        Ok(stdout)
    }

    /// Substitute per-request placeholders in the configured arguments.
    fn expand_args(&self) -> Vec<String> {
        let voice = self.voice.voice.as_deref().unwrap_or("");
        let rate = format!("{:.3}", self.voice.rate.unwrap_or(1.0));

        self.args
            .iter()
            .map(|arg| {
                arg.replace("{model}", &self.model)
                    .replace("{voice}", voice)
                    .replace("{rate}", &rate)
            })
            .collect()
    }
}

#[async_trait]
impl Synthesizer for CommandSynthesizer {
    async fn initialize(&self) -> Result<()> {
        let metadata = tokio::fs::metadata(&self.program).await.map_err(|e| {
            SynthError::ProviderUnavailable(format!(
                "Cannot access {}: {}",
                self.program.display(),
                e
            ))
        })?;

        if !metadata.is_file() {
            return Err(SynthError::ProviderUnavailable(format!(
                "{} is not a file",
                self.program.display()
            )));
        }

        self.initialized.store(true, Ordering::SeqCst);
        log::debug!("Command synthesizer ready: {}", self.program.display());
        Ok(())
    }

    async fn synthesize(&self, text: &str) -> Result<AudioBytes> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(SynthError::NotInitialized);
        }

        let mut child = Command::new(&self.program)
            .args(self.expand_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SynthError::CommandError(format!("Failed to execute: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| SynthError::CommandError("stdin unavailable".into()))?;
        let input = format!("{}\n", text);
        let writer = tokio::spawn(async move {
            stdin.write_all(input.as_bytes()).await?;
            stdin.shutdown().await
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SynthError::CommandError(format!("Failed to wait: {}", e)))?;

        if let Ok(Err(e)) = writer.await {
            log::debug!("TTS command closed stdin early: {}", e);
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SynthError::CommandError(format!(
                "Command failed: {}",
                stderr.trim()
            )));
        }

        self.decode_output(output.stdout)
    }

    fn voice(&self) -> &VoiceParams {
        &self.voice
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &'static str {
        "Command"
    }
}
