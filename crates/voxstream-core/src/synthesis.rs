//! Synthesis engine interface
//!
//! The driver treats the text-to-speech engine as an opaque capability: it
//! asks for a voice and for text to be synthesized, and receives 16-bit PCM
//! bursts through a callback while synthesis is still running.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Speaker identity within a multi-speaker voice model
pub type SpeakerId = i64;

/// Output format of a synthesis engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Sample rate in Hz (default: 22050)
    pub sample_rate: u32,
    /// Number of interleaved channels (default: 1 for mono)
    pub channels: u16,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            channels: 1,
        }
    }
}

impl SynthesisConfig {
    /// Duration of `samples` interleaved samples in milliseconds
    pub fn duration_ms(&self, samples: usize) -> f32 {
        let frames = samples as f32 / self.channels.max(1) as f32;
        frames / self.sample_rate as f32 * 1000.0
    }
}

/// A text-to-speech engine that streams its output.
///
/// Implementations are driven from a blocking worker thread, one call at a
/// time; they never see concurrent calls.
pub trait SynthesisEngine: Send {
    /// Output format of every chunk this engine produces
    fn synthesis_config(&self) -> SynthesisConfig;

    /// Switch voice identity for subsequent synthesis calls
    fn set_speaker(&mut self, speaker: SpeakerId) -> Result<()>;

    /// Synthesize `text`, invoking `on_chunk` zero or more times in generation
    /// order from the calling thread, then return once the text is done.
    ///
    /// The slice passed to `on_chunk` is only valid for the duration of that call.
    fn synthesize_to_stream(&mut self, text: &str, on_chunk: &mut dyn FnMut(&[i16]))
        -> Result<()>;
}

impl<E: SynthesisEngine + ?Sized> SynthesisEngine for Box<E> {
    fn synthesis_config(&self) -> SynthesisConfig {
        (**self).synthesis_config()
    }

    fn set_speaker(&mut self, speaker: SpeakerId) -> Result<()> {
        (**self).set_speaker(speaker)
    }

    fn synthesize_to_stream(
        &mut self,
        text: &str,
        on_chunk: &mut dyn FnMut(&[i16]),
    ) -> Result<()> {
        (**self).synthesize_to_stream(text, on_chunk)
    }
}
