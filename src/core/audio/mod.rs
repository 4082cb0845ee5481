//! Audio container conversion between WAV files and the canonical wire PCM shape.
//!
//! The wire protocol accepts exactly one audio encoding: raw little-endian
//! signed 16-bit PCM, single channel, 24kHz. This module bridges between that
//! shape and container-wrapped audio as it exists on disk:
//!
//! - Inbound: decode a WAV source (any bit depth or channel count hound can
//!   read), downmix to mono, resample to 24kHz, and emit raw sample bytes.
//! - Outbound: wrap an accumulated raw PCM buffer back into a playable WAV
//!   file, overwriting any previous artifact at the target path.
//!
//! Resampling is linear interpolation. That is sufficient for speech uploads;
//! callers needing higher-fidelity conversion should preprocess offline.

use std::io::{Cursor, Read};
use std::path::Path;

use thiserror::Error;

/// Sample rate required by the wire protocol.
pub const CANONICAL_SAMPLE_RATE: u32 = 24_000;

/// Bit depth required by the wire protocol.
pub const CANONICAL_BIT_DEPTH: u16 = 16;

/// Channel count required by the wire protocol.
pub const CANONICAL_CHANNELS: u16 = 1;

/// Errors produced while converting audio at the container boundary.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The source could not be read or is not a valid WAV container.
    #[error("audio container error: {0}")]
    Container(#[from] hound::Error),

    /// The container parsed but its shape cannot be normalized.
    #[error("unsupported audio shape: {0}")]
    Unsupported(String),
}

/// Read a WAV file from disk and normalize it to the canonical wire shape.
pub fn normalize_wav_file(path: &Path) -> Result<Vec<u8>, CodecError> {
    let reader = hound::WavReader::open(path)?;
    normalize_reader(reader)
}

/// Normalize WAV container data already held in memory.
pub fn normalize_wav_bytes(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let reader = hound::WavReader::new(Cursor::new(data))?;
    normalize_reader(reader)
}

fn normalize_reader<R: Read>(reader: hound::WavReader<R>) -> Result<Vec<u8>, CodecError> {
    let spec = reader.spec();
    tracing::debug!(
        sample_rate = spec.sample_rate,
        channels = spec.channels,
        bits = spec.bits_per_sample,
        "normalizing source audio"
    );

    if spec.channels == 0 {
        return Err(CodecError::Unsupported("zero channels".to_string()));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
    };

    let mono = downmix(&samples, spec.channels);
    let resampled = resample(&mono, spec.sample_rate, CANONICAL_SAMPLE_RATE);
    Ok(to_pcm16_bytes(&resampled))
}

/// Fold interleaved multi-channel samples into mono by averaging each frame.
fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let channels = channels as usize;
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample audio to the target rate using linear interpolation.
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio) as usize;

    let mut resampled = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let pos = i as f64 * ratio;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let a = samples[idx.min(samples.len() - 1)];
        let b = samples.get(idx + 1).copied().unwrap_or(a);
        resampled.push(a + (b - a) * frac);
    }
    resampled
}

fn to_pcm16_bytes(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        let clamped = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&clamped.to_le_bytes());
    }
    bytes
}

/// Wrap raw canonical PCM into a playable WAV file at `path`, overwriting any
/// existing file.
///
/// The buffer is assumed to be mono 16-bit 24kHz little-endian samples; an odd
/// trailing byte cannot form a sample and is dropped.
pub fn write_wav(path: &Path, pcm: &[u8]) -> Result<(), CodecError> {
    if pcm.len() % 2 != 0 {
        tracing::warn!("PCM buffer has an odd trailing byte, dropping it");
    }

    let spec = hound::WavSpec {
        channels: CANONICAL_CHANNELS,
        sample_rate: CANONICAL_SAMPLE_RATE,
        bits_per_sample: CANONICAL_BIT_DEPTH,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for chunk in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([chunk[0], chunk[1]]))?;
    }
    writer.finalize()?;
    Ok(())
}
