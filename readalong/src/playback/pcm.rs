//! PCM decoding and chunk-boundary smoothing.

use speech_client::audio;

use super::PlaybackError;

/// Target peak after normalization.
const TARGET_PEAK: f32 = 0.9;

/// Default crossfade length, about 10 ms at 24 kHz.
pub const DEFAULT_CROSSFADE_SAMPLES: usize = 240;

/// Decode PCM16 LE mono (or a mono/stereo WAV file) into f32 samples.
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>, PlaybackError> {
    let unwrapped;
    let pcm = if audio::is_wav(bytes) {
        let (pcm, _rate) =
            audio::wav_to_pcm16(bytes).map_err(|e| PlaybackError::InvalidAudio(e.to_string()))?;
        unwrapped = pcm;
        &unwrapped[..]
    } else {
        bytes
    };

    if pcm.len() % 2 != 0 {
        return Err(PlaybackError::InvalidAudio(format!(
            "odd byte count {} for 16-bit PCM",
            pcm.len()
        )));
    }

    Ok(pcm
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect())
}

/// Evens out loudness across chunks and hides the seam between them.
#[derive(Debug)]
pub struct Smoother {
    crossfade: usize,
    running_peak: f32,
    tail: Vec<f32>,
}

impl Smoother {
    pub fn new(crossfade: usize) -> Self {
        Self {
            crossfade,
            running_peak: 0.0,
            tail: Vec::new(),
        }
    }

    /// Normalize `samples` and fade the previous chunk's tail into their head.
    pub fn process(&mut self, mut samples: Vec<f32>) -> Vec<f32> {
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        self.running_peak = self.running_peak.max(peak);

        if self.running_peak > 0.0 {
            let gain = TARGET_PEAK / self.running_peak;
            for s in &mut samples {
                *s *= gain;
            }
        }

        let n = self.crossfade.min(self.tail.len()).min(samples.len());
        let tail_start = self.tail.len() - n;
        for i in 0..n {
            let t = (i + 1) as f32 / (n + 1) as f32;
            samples[i] = self.tail[tail_start + i] * (1.0 - t) + samples[i] * t;
        }

        let keep = self.crossfade.min(samples.len());
        self.tail.clear();
        self.tail.extend_from_slice(&samples[samples.len() - keep..]);

        samples
    }

    /// Forget the previous chunk, e.g. after playback was stopped.
    pub fn reset_tail(&mut self) {
        self.tail.clear();
    }
}
