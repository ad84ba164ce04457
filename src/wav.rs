//! RIFF/WAVE export of rendered impulse responses: PCM 16-bit signed
//! little-endian, mono.

use std::path::Path;

use crate::error::{EngineError, Result};

fn wav_err(e: hound::Error) -> EngineError {
    EngineError::Internal(format!("wav i/o: {e}"))
}

pub fn encode_sample(x: f32) -> i16 {
    (x.clamp(-1.0, 1.0) * 32767.0).round() as i16
}

pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_err)?;
    for &sample in samples {
        writer.write_sample(encode_sample(sample)).map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)
}

pub fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut reader = hound::WavReader::open(path).map_err(wav_err)?;
    let spec = reader.spec();
    if spec.channels != 1 || spec.bits_per_sample != 16 {
        return Err(EngineError::Internal(format!(
            "unsupported wav layout: {} channels, {} bits",
            spec.channels, spec.bits_per_sample
        )));
    }
    let samples: std::result::Result<Vec<i16>, _> = reader.samples::<i16>().collect();
    let samples = samples.map_err(wav_err)?;
    Ok((
        samples.iter().map(|&s| s as f32 / 32767.0).collect(),
        spec.sample_rate,
    ))
}
