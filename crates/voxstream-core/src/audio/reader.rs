//! Real-time pull path from the PCM buffer into an output device callback

use std::sync::Arc;
use tokio::sync::broadcast;

use super::pcm_buffer::{ReadOutcome, StreamingPcmBuffer};

/// Fired once each time buffered audio runs out during a device pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStopped;

/// Device-side handle onto a [`StreamingPcmBuffer`].
///
/// Cheap to clone; one clone usually lives inside the host's audio callback.
#[derive(Clone)]
pub struct PcmReader {
    buffer: Arc<StreamingPcmBuffer>,
    stopped: broadcast::Sender<PlaybackStopped>,
}

impl PcmReader {
    pub fn new(buffer: Arc<StreamingPcmBuffer>, stopped: broadcast::Sender<PlaybackStopped>) -> Self {
        Self { buffer, stopped }
    }

    /// Fill a device buffer, notifying subscribers if this pull drained the audio.
    ///
    /// Always writes every sample of `out`; silence is the fallback.
    pub fn fill(&self, out: &mut [f32]) -> ReadOutcome {
        let outcome = self.buffer.read(out);
        if outcome.is_drained() {
            // No receivers is not an error here
            let _ = self.stopped.send(PlaybackStopped);
        }
        outcome
    }

    /// Convert into a boxed callback suitable for [`AudioHost::create_clip`].
    ///
    /// [`AudioHost::create_clip`]: super::clip::AudioHost::create_clip
    pub fn into_callback(self) -> super::clip::PullCallback {
        Box::new(move |out: &mut [f32]| {
            self.fill(out);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SampleChunk;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_stopped_fires_once_per_drain() {
        let buffer = Arc::new(StreamingPcmBuffer::new());
        let (tx, mut rx) = broadcast::channel(4);
        let reader = PcmReader::new(Arc::clone(&buffer), tx);

        buffer.append(SampleChunk::from(&[0.1f32, 0.2][..]));
        let mut out = [0.0; 2];

        reader.fill(&mut out);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        reader.fill(&mut out);
        assert_eq!(rx.try_recv(), Ok(PlaybackStopped));

        reader.fill(&mut out);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_fill_without_subscribers() {
        let buffer = Arc::new(StreamingPcmBuffer::new());
        let (tx, rx) = broadcast::channel(1);
        drop(rx);
        let mut callback = PcmReader::new(Arc::clone(&buffer), tx).into_callback();

        buffer.append(SampleChunk::from(&[0.5f32][..]));
        let mut out = [1.0; 3];
        callback(&mut out);
        assert_eq!(out, [0.5, 0.0, 0.0]);
    }
}
