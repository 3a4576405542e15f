//! Immutable sample chunks produced by one synthesis callback

use std::sync::Arc;

/// Divisor mapping signed 16-bit PCM onto [-1, 1)
const I16_SCALE: f32 = 32768.0;

/// One contiguous run of normalized samples.
///
/// Cloning is cheap; the samples are shared and never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleChunk {
    samples: Arc<[f32]>,
}

impl SampleChunk {
    /// Wrap already-normalized samples
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    /// Convert raw 16-bit PCM into a chunk.
    ///
    /// The input is only borrowed; it may be a buffer owned by the synthesis
    /// engine that is invalidated once the callback returns.
    pub fn from_i16(pcm: &[i16]) -> Self {
        let samples: Vec<f32> = pcm.iter().map(|&s| s as f32 / I16_SCALE).collect();
        Self::new(samples)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

impl From<Vec<f32>> for SampleChunk {
    fn from(samples: Vec<f32>) -> Self {
        Self::new(samples)
    }
}

impl From<&[f32]> for SampleChunk {
    fn from(samples: &[f32]) -> Self {
        Self {
            samples: samples.into(),
        }
    }
}
