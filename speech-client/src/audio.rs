//! PCM16 helpers shared by providers and consumers.
//!
//! Synthesizers hand out raw 16-bit little-endian mono PCM. Engines that emit
//! WAV are converted here so nothing downstream has to care.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::io::Cursor;

use crate::error::{Result, SynthError};
use crate::synthesizer::AudioBytes;

/// Check for a RIFF/WAVE header.
pub fn is_wav(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

/// Decode a WAV file into PCM16 mono bytes.
///
/// Multi-channel input is downmixed by averaging each frame. Returns the PCM
/// bytes together with the file's sample rate.
pub fn wav_to_pcm16(bytes: &[u8]) -> Result<(AudioBytes, u32)> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| SynthError::InvalidAudio(format!("Failed to read WAV header: {}", e)))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples: Vec<i16> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample as i32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| rescale_int(v, bits)))
                .collect::<std::result::Result<_, _>>()
        }
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<std::result::Result<_, _>>(),
    }
    .map_err(|e| SynthError::InvalidAudio(format!("Failed to read WAV samples: {}", e)))?;

    let mut pcm = Vec::with_capacity(samples.len() / channels * 2);
    for frame in samples.chunks(channels) {
        let sum: i32 = frame.iter().map(|&s| s as i32).sum();
        let mixed = (sum / frame.len() as i32) as i16;
        pcm.extend_from_slice(&mixed.to_le_bytes());
    }

    Ok((pcm, spec.sample_rate))
}

/// Wrap PCM16 mono bytes in a WAV container.
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| SynthError::InvalidAudio(e.to_string()))?;
        for pair in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(|e| SynthError::InvalidAudio(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| SynthError::InvalidAudio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Resample PCM16 mono bytes from `from_rate` to `to_rate`.
pub fn resample_pcm16(pcm: &[u8], from_rate: u32, to_rate: u32) -> Result<AudioBytes> {
    if from_rate == to_rate || pcm.len() < 2 {
        return Ok(pcm.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(SynthError::InvalidAudio(format!(
            "Cannot resample {} Hz audio to {} Hz",
            from_rate, to_rate
        )));
    }

    let samples: Vec<f32> = pcm
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32_768.0)
        .collect();

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| SynthError::InvalidAudio(format!("Resampler setup failed: {}", e)))?;

    let output = resampler
        .process(&[samples], None)
        .map_err(|e| SynthError::InvalidAudio(format!("Resampling failed: {}", e)))?;

    let resampled = output.into_iter().next().unwrap_or_default();
    Ok(resampled
        .iter()
        .flat_map(|v| ((v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).to_le_bytes())
        .collect())
}

fn rescale_int(value: i32, bits: i32) -> i16 {
    if bits > 16 {
        (value >> (bits - 16)) as i16
    } else if bits < 16 {
        (value << (16 - bits)) as i16
    } else {
        value as i16
    }
}
