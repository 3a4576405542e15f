//! Voxstream Core - Streaming Speech Playback
//!
//! Bridges a text-to-speech engine that produces audio in bursts with an
//! audio device that pulls fixed-size buffers on a real-time schedule.
//!
//! # Architecture
//!
//! - [`StreamingPcmBuffer`]: chunk queue + read cursor shared by one producer
//!   and one real-time consumer, with atomic reset for interruptions
//! - [`SpeechDriver`]: one background synthesis task per driver with a single
//!   last-write-wins continuation slot
//! - [`PcmReader`]: the device pull path; fires [`PlaybackStopped`] once per drain
//!
//! # Example
//!
//! ```ignore
//! use voxstream_core::{SpeakerConfig, SpeechDriver};
//!
//! let driver = SpeechDriver::with_output(engine, SpeakerConfig::default(), &host)?;
//! driver.speak("I'm going to", None);
//! driver.override_speech("I'm going to school").await?;
//! ```

pub mod audio;
pub mod config;
pub mod driver;
pub mod error;
pub mod synthesis;

pub use audio::{
    AudioHost, BufferStats, ClipResource, ClipSpec, OutputClip, PcmReader, PlaybackStopped,
    PullCallback, ReadOutcome, SampleChunk, StreamingPcmBuffer,
};
pub use config::SpeakerConfig;
pub use driver::{SpeechDriver, SpeechHandle, SpeechResult};
pub use error::{Error, Result};
pub use synthesis::{SpeakerId, SynthesisConfig, SynthesisEngine};
