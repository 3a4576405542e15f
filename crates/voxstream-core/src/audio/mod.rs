//! PCM buffering and the device-facing output path

mod chunk;
mod clip;
mod pcm_buffer;
mod reader;

pub use chunk::SampleChunk;
pub use clip::{AudioHost, ClipResource, ClipSpec, OutputClip, PullCallback, DEFAULT_CLIP_NAME};
pub use pcm_buffer::{BufferStats, ReadOutcome, StreamingPcmBuffer};
pub use reader::{PcmReader, PlaybackStopped};
