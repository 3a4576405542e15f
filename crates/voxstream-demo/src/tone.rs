//! Tone-burst synthesis engine.
//!
//! Stands in for a real TTS model: every word becomes a short enveloped sine
//! burst, delivered through the streaming callback with a configurable delay
//! so the output arrives in bursts like a real synthesizer's.

use serde::Deserialize;
use std::f32::consts::TAU;
use std::time::Duration;
use tracing::debug;
use voxstream_core::{Error, Result, SpeakerId, SynthesisConfig, SynthesisEngine};

#[derive(Debug, Clone, Deserialize)]
pub struct ToneSettings {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_base_frequency_hz")]
    pub base_frequency_hz: f32,

    /// Burst length per character of a word
    #[serde(default = "default_ms_per_char")]
    pub ms_per_char: u32,

    /// Silence appended after each word
    #[serde(default = "default_gap_ms")]
    pub gap_ms: u32,

    #[serde(default = "default_amplitude")]
    pub amplitude: f32,

    /// Simulated compute time per word
    #[serde(default = "default_word_latency_ms")]
    pub word_latency_ms: u64,

    #[serde(default = "default_num_speakers")]
    pub num_speakers: SpeakerId,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            base_frequency_hz: default_base_frequency_hz(),
            ms_per_char: default_ms_per_char(),
            gap_ms: default_gap_ms(),
            amplitude: default_amplitude(),
            word_latency_ms: default_word_latency_ms(),
            num_speakers: default_num_speakers(),
        }
    }
}

fn default_sample_rate() -> u32 {
    22050
}

fn default_base_frequency_hz() -> f32 {
    220.0
}

fn default_ms_per_char() -> u32 {
    45
}

fn default_gap_ms() -> u32 {
    60
}

fn default_amplitude() -> f32 {
    0.4
}

fn default_word_latency_ms() -> u64 {
    25
}

fn default_num_speakers() -> SpeakerId {
    4
}

pub struct ToneEngine {
    settings: ToneSettings,
    speaker: SpeakerId,
}

impl ToneEngine {
    pub fn new(settings: ToneSettings) -> Self {
        Self {
            settings,
            speaker: 0,
        }
    }

    fn samples_for_ms(&self, ms: u32) -> usize {
        (self.settings.sample_rate as u64 * ms as u64 / 1000) as usize
    }

    /// One word as 16-bit PCM: a sine burst with a linear fade at both ends
    fn render_word(&self, word: &str) -> Vec<i16> {
        let chars = word.chars().count() as u32;
        let tone_len = self.samples_for_ms(self.settings.ms_per_char * chars);
        let gap_len = self.samples_for_ms(self.settings.gap_ms);

        let pitch = 1.0 + self.speaker as f32 * 0.25 + (chars % 5) as f32 * 0.1;
        let frequency = self.settings.base_frequency_hz * pitch;
        let fade = (tone_len / 10).max(1);
        let step = TAU * frequency / self.settings.sample_rate as f32;

        let mut pcm = Vec::with_capacity(tone_len + gap_len);
        for i in 0..tone_len {
            let envelope = (i.min(tone_len - 1 - i) as f32 / fade as f32).min(1.0);
            let sample = (i as f32 * step).sin() * self.settings.amplitude * envelope;
            pcm.push((sample.clamp(-1.0, 1.0) * 32767.0) as i16);
        }
        pcm.resize(tone_len + gap_len, 0);
        pcm
    }
}

impl SynthesisEngine for ToneEngine {
    fn synthesis_config(&self) -> SynthesisConfig {
        SynthesisConfig {
            sample_rate: self.settings.sample_rate,
            channels: 1,
        }
    }

    fn set_speaker(&mut self, speaker: SpeakerId) -> Result<()> {
        if !(0..self.settings.num_speakers).contains(&speaker) {
            return Err(Error::SynthesisError(format!(
                "Speaker {} out of range (0..{})",
                speaker, self.settings.num_speakers
            )));
        }
        self.speaker = speaker;
        Ok(())
    }

    fn synthesize_to_stream(
        &mut self,
        text: &str,
        on_chunk: &mut dyn FnMut(&[i16]),
    ) -> Result<()> {
        debug!("Synthesizing {:?} with speaker {}", text, self.speaker);
        let latency = Duration::from_millis(self.settings.word_latency_ms);

        for word in text.split_whitespace() {
            std::thread::sleep(latency);
            let pcm = self.render_word(word);
            on_chunk(&pcm);
        }
        Ok(())
    }
}
