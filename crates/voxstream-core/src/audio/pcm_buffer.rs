//! Streaming PCM buffer shared between a synthesis producer and a real-time puller.
//!
//! The buffer is an append-only queue of [`SampleChunk`]s plus a read cursor
//! that logically spans their concatenation. One short mutex covers `append`,
//! `read` and `reset`, so a reader observes either the state before a reset or
//! the state after it, never a mix.
//!
//! Every reset bumps a generation counter. Producers that captured an older
//! generation have their chunks dropped by [`StreamingPcmBuffer::append_tagged`],
//! which keeps audio from an interrupted synthesis pass out of the new stream.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::chunk::SampleChunk;

/// Result of a single [`StreamingPcmBuffer::read`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The whole output slice was filled with buffered audio.
    Filled,
    /// Buffered audio ran out during this read. `copied` real samples were
    /// written and the rest zero-filled. Reported once per drain.
    Drained { copied: usize },
    /// Nothing was buffered and the drain was already reported; the output is silence.
    Empty,
}

impl ReadOutcome {
    /// Whether this read is the transition to fully drained
    pub fn is_drained(&self) -> bool {
        matches!(self, ReadOutcome::Drained { .. })
    }
}

/// Snapshot of buffer state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferStats {
    /// Chunks still holding unread samples
    pub buffered_chunks: usize,
    pub unread_samples: usize,
    /// Samples read since the last reset
    pub cursor: usize,
    pub generation: u64,
    /// Audio was appended and its drain has not been reported yet
    pub audible: bool,
}

#[derive(Default)]
struct BufferState {
    chunks: VecDeque<SampleChunk>,
    /// Read offset into the front chunk
    head_offset: usize,
    cursor: usize,
    appended: usize,
    generation: u64,
    audible: bool,
    /// Fully-read chunks; freed by the producer so the reader never deallocates
    retired: Vec<SampleChunk>,
}

impl BufferState {
    fn push(&mut self, chunk: SampleChunk) {
        self.retired.clear();
        self.appended += chunk.len();
        self.audible = true;
        self.chunks.push_back(chunk);

        // Room for every buffered chunk to retire without growing the vec
        let spare = self.retired.capacity() - self.retired.len();
        if spare < self.chunks.len() {
            self.retired.reserve(self.chunks.len());
        }
    }

    fn copy_into(&mut self, out: &mut [f32]) -> usize {
        let mut written = 0;

        while written < out.len() {
            let Some(front) = self.chunks.front() else {
                break;
            };

            let available = &front.samples()[self.head_offset.min(front.len())..];
            let n = available.len().min(out.len() - written);
            out[written..written + n].copy_from_slice(&available[..n]);
            written += n;
            self.head_offset += n;

            if self.head_offset >= front.len() {
                self.retire_front();
            }
        }

        self.cursor += written;
        written
    }

    fn retire_front(&mut self) {
        self.head_offset = 0;
        if let Some(done) = self.chunks.pop_front() {
            if self.retired.len() < self.retired.capacity() {
                self.retired.push(done);
            }
        }
    }

    fn unread(&self) -> usize {
        self.appended - self.cursor
    }
}

/// Chunked PCM queue with a monotonically advancing read cursor.
#[derive(Default)]
pub struct StreamingPcmBuffer {
    state: Mutex<BufferState>,
}

impl StreamingPcmBuffer {
    /// Create an empty buffer at generation 0
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        // Every critical section leaves the state consistent, so a panic
        // elsewhere while holding the lock does not invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a chunk to the current generation.
    ///
    /// Zero-length chunks are accepted and discarded.
    pub fn append(&self, chunk: SampleChunk) {
        if chunk.is_empty() {
            return;
        }
        self.lock().push(chunk);
    }

    /// Append a chunk produced for `generation`.
    ///
    /// Returns `false` and drops the chunk if the buffer was reset since the
    /// producer captured its generation.
    pub fn append_tagged(&self, generation: u64, chunk: SampleChunk) -> bool {
        let mut state = self.lock();
        if state.generation != generation {
            let current = state.generation;
            drop(state);
            debug!(
                "Dropping stale chunk of {} samples (generation {} < {})",
                chunk.len(),
                generation,
                current
            );
            return false;
        }
        if !chunk.is_empty() {
            state.push(chunk);
        }
        true
    }

    /// Fill `out` with the next unread samples, zero-padding past the end.
    ///
    /// Never blocks beyond the buffer's own short critical section and never
    /// allocates, so it is safe to call from an audio device callback.
    pub fn read(&self, out: &mut [f32]) -> ReadOutcome {
        if out.is_empty() {
            return ReadOutcome::Filled;
        }

        let mut state = self.lock();
        let copied = state.copy_into(out);
        if copied == out.len() {
            return ReadOutcome::Filled;
        }

        out[copied..].fill(0.0);
        if std::mem::take(&mut state.audible) {
            ReadOutcome::Drained { copied }
        } else {
            ReadOutcome::Empty
        }
    }

    /// Discard all buffered audio and restart the cursor.
    ///
    /// Returns the new generation; producers should tag later appends with it.
    pub fn reset(&self) -> u64 {
        let (stale, generation) = {
            let mut state = self.lock();
            state.generation += 1;
            state.cursor = 0;
            state.appended = 0;
            state.head_offset = 0;
            state.retired.clear();
            (std::mem::take(&mut state.chunks), state.generation)
        };

        debug!(
            "PCM buffer reset to generation {}, discarded {} chunks",
            generation,
            stale.len()
        );
        generation
    }

    /// Generation producers should tag appends with
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Samples read since the last reset
    pub fn cursor(&self) -> usize {
        self.lock().cursor
    }

    pub fn has_unread(&self) -> bool {
        self.lock().unread() > 0
    }

    pub fn stats(&self) -> BufferStats {
        let state = self.lock();
        BufferStats {
            buffered_chunks: state.chunks.len(),
            unread_samples: state.unread(),
            cursor: state.cursor,
            generation: state.generation,
            audible: state.audible,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(samples: &[f32]) -> SampleChunk {
        SampleChunk::from(samples)
    }

    #[test]
    fn test_read_within_single_chunk() {
        let buffer = StreamingPcmBuffer::new();
        buffer.append(chunk(&[0.1, 0.2, 0.3]));

        let mut out = [9.0; 2];
        assert_eq!(buffer.read(&mut out), ReadOutcome::Filled);
        assert_eq!(out, [0.1, 0.2]);
        assert_eq!(buffer.cursor(), 2);

        assert_eq!(buffer.read(&mut out), ReadOutcome::Drained { copied: 1 });
        assert_eq!(out, [0.3, 0.0]);
    }

    #[test]
    fn test_read_across_chunk_boundary() {
        let buffer = StreamingPcmBuffer::new();
        buffer.append(chunk(&[1.0, 2.0]));
        buffer.append(chunk(&[3.0, 4.0, 5.0]));

        let mut out = [0.0; 4];
        assert_eq!(buffer.read(&mut out), ReadOutcome::Filled);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);

        let stats = buffer.stats();
        assert_eq!(stats.cursor, 4);
        assert_eq!(stats.unread_samples, 1);
        // The first chunk is fully behind the cursor and pruned
        assert_eq!(stats.buffered_chunks, 1);

        let mut tail = [0.0; 1];
        assert_eq!(buffer.read(&mut tail), ReadOutcome::Filled);
        assert_eq!(tail, [5.0]);
    }

    #[test]
    fn test_read_spans_many_chunks() {
        let buffer = StreamingPcmBuffer::new();
        for i in 0..5 {
            buffer.append(chunk(&[i as f32]));
        }
        let mut out = [0.0; 5];
        assert_eq!(buffer.read(&mut out), ReadOutcome::Filled);
        assert_eq!(out, [0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buffer.stats().buffered_chunks, 0);
    }

    #[test]
    fn test_empty_buffer_reads_silence() {
        let buffer = StreamingPcmBuffer::new();
        let mut out = [0.5; 8];
        assert_eq!(buffer.read(&mut out), ReadOutcome::Empty);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_drain_reported_once() {
        let buffer = StreamingPcmBuffer::new();
        buffer.append(chunk(&[0.25, 0.5]));

        let mut out = [0.0; 2];
        assert_eq!(buffer.read(&mut out), ReadOutcome::Filled);
        assert_eq!(buffer.read(&mut out), ReadOutcome::Drained { copied: 0 });
        assert_eq!(buffer.read(&mut out), ReadOutcome::Empty);
        assert_eq!(buffer.read(&mut out), ReadOutcome::Empty);

        buffer.append(chunk(&[0.75]));
        assert_eq!(buffer.read(&mut out), ReadOutcome::Drained { copied: 1 });
        assert_eq!(out, [0.75, 0.0]);
    }

    #[test]
    fn test_zero_length_chunks_skipped() {
        let buffer = StreamingPcmBuffer::new();
        buffer.append(chunk(&[]));
        buffer.append(chunk(&[1.0]));
        buffer.append(chunk(&[]));
        buffer.append(chunk(&[2.0]));

        let mut out = [0.0; 3];
        assert_eq!(buffer.read(&mut out), ReadOutcome::Drained { copied: 2 });
        assert_eq!(out, [1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_zero_length_chunk_alone_is_not_audible() {
        let buffer = StreamingPcmBuffer::new();
        buffer.append(chunk(&[]));
        let mut out = [0.0; 4];
        assert_eq!(buffer.read(&mut out), ReadOutcome::Empty);
    }

    #[test]
    fn test_zero_length_read_is_noop() {
        let buffer = StreamingPcmBuffer::new();
        buffer.append(chunk(&[1.0]));
        let mut out: [f32; 0] = [];
        assert_eq!(buffer.read(&mut out), ReadOutcome::Filled);
        assert_eq!(buffer.cursor(), 0);
        assert!(buffer.has_unread());
    }

    #[test]
    fn test_reset_discards_everything() {
        let buffer = StreamingPcmBuffer::new();
        buffer.append(chunk(&[1.0, 1.0, 1.0]));
        let mut out = [0.0; 1];
        buffer.read(&mut out);

        let generation = buffer.reset();
        assert_eq!(generation, 1);
        assert_eq!(buffer.cursor(), 0);
        assert!(!buffer.has_unread());

        let mut out = [0.5; 4];
        // Audio was still playing, so the first poll after reset reports the drain
        assert_eq!(buffer.read(&mut out), ReadOutcome::Drained { copied: 0 });
        assert_eq!(out, [0.0; 4]);
        for _ in 0..3 {
            assert_eq!(buffer.read(&mut out), ReadOutcome::Empty);
            assert_eq!(out, [0.0; 4]);
        }
    }

    #[test]
    fn test_stale_generation_dropped() {
        let buffer = StreamingPcmBuffer::new();
        let old = buffer.generation();
        assert!(buffer.append_tagged(old, chunk(&[1.0])));

        let new = buffer.reset();
        assert!(!buffer.append_tagged(old, chunk(&[2.0])));
        assert!(buffer.append_tagged(new, chunk(&[3.0])));

        let mut out = [0.0; 2];
        assert_eq!(buffer.read(&mut out), ReadOutcome::Drained { copied: 1 });
        assert_eq!(out, [3.0, 0.0]);
    }

    #[test]
    fn test_concatenation_preserved_under_odd_read_sizes() {
        let buffer = StreamingPcmBuffer::new();
        let mut expected = Vec::new();
        for len in [3usize, 0, 7, 1, 5, 2] {
            let samples: Vec<f32> = (0..len).map(|i| (expected.len() + i) as f32).collect();
            expected.extend_from_slice(&samples);
            buffer.append(SampleChunk::new(samples));
        }

        let mut collected = Vec::new();
        let mut out = [0.0; 4];
        loop {
            let outcome = buffer.read(&mut out);
            match outcome {
                ReadOutcome::Filled => collected.extend_from_slice(&out),
                ReadOutcome::Drained { copied } => {
                    collected.extend_from_slice(&out[..copied]);
                    assert!(out[copied..].iter().all(|&s| s == 0.0));
                    break;
                }
                ReadOutcome::Empty => break,
            }
        }
        assert_eq!(collected, expected);
    }

    #[test]
    fn test_concurrent_append_and_read() {
        use std::sync::Arc;
        use std::thread;

        let buffer = Arc::new(StreamingPcmBuffer::new());
        let total = 10_000usize;

        let producer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut next = 0usize;
                while next < total {
                    let len = (next % 37 + 1).min(total - next);
                    let samples: Vec<f32> = (next..next + len).map(|i| i as f32).collect();
                    buffer.append(SampleChunk::new(samples));
                    next += len;
                }
            })
        };

        let mut collected = Vec::with_capacity(total);
        let mut out = [0.0; 64];
        while collected.len() < total {
            let copied = match buffer.read(&mut out) {
                ReadOutcome::Filled => out.len(),
                ReadOutcome::Drained { copied } => copied,
                ReadOutcome::Empty => 0,
            };
            collected.extend_from_slice(&out[..copied]);
            if copied == 0 {
                thread::yield_now();
            }
        }
        producer.join().unwrap();

        assert!(collected.iter().enumerate().all(|(i, &s)| s == i as f32));
    }

    #[test]
    fn test_reset_is_atomic_against_concurrent_append_and_read() {
        use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
        use std::thread;

        // Chunks carry `generation + 1` so they never look like silence
        fn tagged(generation: u64) -> SampleChunk {
            SampleChunk::new(vec![(generation + 1) as f32; 5])
        }

        let buffer = StreamingPcmBuffer::new();
        let completed_reset = AtomicU64::new(0);
        let done = AtomicBool::new(false);

        thread::scope(|scope| {
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    // Often stale by the time it lands
                    let generation = buffer.generation();
                    thread::yield_now();
                    buffer.append_tagged(generation, tagged(generation));
                }
            });

            scope.spawn(|| {
                for _ in 0..2_000 {
                    let generation = buffer.reset();
                    completed_reset.store(generation, Ordering::Release);
                    thread::yield_now();
                }
                done.store(true, Ordering::Release);
            });

            let mut out = [0.0; 7];
            let mut last_stats = buffer.stats();
            while !done.load(Ordering::Acquire) {
                let floor = completed_reset.load(Ordering::Acquire);
                let copied = match buffer.read(&mut out) {
                    ReadOutcome::Filled => out.len(),
                    ReadOutcome::Drained { copied } => copied,
                    ReadOutcome::Empty => 0,
                };

                // Real samples form a prefix, all from one generation no
                // older than the last reset that finished before this read
                assert!(out[copied..].iter().all(|&s| s == 0.0));
                if let Some(&first) = out[..copied].first() {
                    assert!(out[..copied].iter().all(|&s| s == first));
                    assert!(first as u64 - 1 >= floor);
                }

                let stats = buffer.stats();
                assert!(stats.generation >= last_stats.generation);
                if stats.generation == last_stats.generation {
                    assert!(stats.cursor >= last_stats.cursor);
                }
                assert_eq!(stats.buffered_chunks == 0, stats.unread_samples == 0);
                last_stats = stats;
            }
        });
    }
}
