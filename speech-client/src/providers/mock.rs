//! Mock synthesizer for testing
//!
//! Provides a configurable synthesizer that can simulate slow calls,
//! failures and recoveries. Audio is a quiet sine tone whose length follows
//! the text (or a fixed duration), so playback timing is predictable.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{Result, SynthError};
use crate::synthesizer::{AudioBytes, DEFAULT_SAMPLE_RATE, Synthesizer, VoiceParams};

const TONE_HZ: f32 = 220.0;
const TONE_AMPLITUDE: f32 = 0.2;

/// A mock synthesizer for pipeline and session tests
pub struct MockSynthesizer {
    /// Number of calls to fail before succeeding (0 = always succeed)
    fail_count: AtomicUsize,
    /// Current synthesize() call count
    call_count: AtomicUsize,
    /// Current initialize() call count
    init_count: AtomicUsize,
    /// Error message returned on failure
    fail_with: Option<String>,
    /// Texts passed to synthesize(), in call order
    requests: Mutex<Vec<String>>,
    /// Simulated synthesis time per call
    latency: Duration,
    /// Samples produced per input character
    samples_per_char: usize,
    /// Fixed output length, overrides samples_per_char
    fixed_duration: Option<Duration>,
    voice: VoiceParams,
    sample_rate: u32,
}

impl MockSynthesizer {
    fn build(fail_count: usize, fail_with: Option<String>) -> Self {
        Self {
            fail_count: AtomicUsize::new(fail_count),
            call_count: AtomicUsize::new(0),
            init_count: AtomicUsize::new(0),
            fail_with,
            requests: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
            samples_per_char: 1_200,
            fixed_duration: None,
            voice: VoiceParams::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    /// Create a synthesizer that always succeeds
    pub fn always_succeeds() -> Self {
        Self::build(0, None)
    }

    /// Create a synthesizer that fails `n` times with the given message, then succeeds
    pub fn fails_then_succeeds(n: usize, message: &str) -> Self {
        Self::build(n, Some(message.to_string()))
    }

    /// Create a synthesizer that always fails with the given message
    pub fn always_fails(message: &str) -> Self {
        Self::build(usize::MAX, Some(message.to_string()))
    }

    /// Sleep this long inside every synthesize() call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Produce `n` samples per character of input
    pub fn with_samples_per_char(mut self, n: usize) -> Self {
        self.samples_per_char = n;
        self
    }

    /// Produce exactly `duration` of audio per call
    pub fn with_fixed_duration(mut self, duration: Duration) -> Self {
        self.fixed_duration = Some(duration);
        self
    }

    /// Use different voice parameters
    pub fn with_voice(mut self, voice: VoiceParams) -> Self {
        self.voice = voice;
        self
    }

    /// Use a different output sample rate
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    /// Get the number of times synthesize() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Get the number of times initialize() was called
    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::SeqCst)
    }

    /// Texts requested so far
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn tone(&self, text: &str) -> AudioBytes {
        let samples = match self.fixed_duration {
            Some(d) => (d.as_secs_f64() * self.sample_rate as f64).round() as usize,
            None => text.chars().count() * self.samples_per_char,
        };

        let step = 2.0 * std::f32::consts::PI * TONE_HZ / self.sample_rate as f32;
        let mut pcm = Vec::with_capacity(samples * 2);
        for n in 0..samples {
            let v = (n as f32 * step).sin() * TONE_AMPLITUDE * i16::MAX as f32;
            pcm.extend_from_slice(&(v as i16).to_le_bytes());
        }
        pcm
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn initialize(&self) -> Result<()> {
        self.init_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn synthesize(&self, text: &str) -> Result<AudioBytes> {
        let call_num = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(text.to_string());
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if call_num < self.fail_count.load(Ordering::SeqCst) {
            if let Some(message) = &self.fail_with {
                return Err(SynthError::ApiError {
                    message: message.clone(),
                    status_code: Some(503),
                });
            }
        }

        Ok(self.tone(text))
    }

    fn voice(&self) -> &VoiceParams {
        &self.voice
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
