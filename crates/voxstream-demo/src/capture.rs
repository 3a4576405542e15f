//! WAV capture of what the simulated device played

use hound::{WavSpec, WavWriter};
use std::path::Path;
use tracing::debug;
use voxstream_core::{Error, Result};

/// Write normalized samples as 16-bit PCM WAV. Returns the number of samples written.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) -> Result<usize> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).map_err(|e| Error::AudioError(e.to_string()))?;
    for &sample in samples {
        // Convert f32 [-1.0, 1.0] to i16
        let sample_i16 = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer
            .write_sample(sample_i16)
            .map_err(|e| Error::AudioError(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| Error::AudioError(e.to_string()))?;

    debug!("Wrote {} samples to {}", samples.len(), path.display());
    Ok(samples.len())
}
