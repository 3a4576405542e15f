//! Speech driver: turns text submissions into a stream of PCM chunks.
//!
//! The driver owns the [`StreamingPcmBuffer`] and runs synthesis on tokio's
//! blocking pool, one task at a time. Three submission modes:
//! - [`SpeechDriver::speak`] interrupts: discards buffered audio, optionally
//!   switches speaker, then synthesizes the new text
//! - [`SpeechDriver::override_speech`] discards buffered audio but keeps the speaker
//! - [`SpeechDriver::continue_speech`] appends after whatever is playing
//!
//! Synthesis is never cancelled mid-pass. Instead each pass is tagged with the
//! buffer generation it started under, and chunks from a pass that was
//! interrupted by a reset are dropped on append.

mod scheduler;

pub use scheduler::{Submission, Submit, TaskScheduler, TaskState};

use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::audio::{
    AudioHost, BufferStats, ClipSpec, OutputClip, PcmReader, PlaybackStopped, SampleChunk,
    StreamingPcmBuffer, DEFAULT_CLIP_NAME,
};
use crate::config::SpeakerConfig;
use crate::error::{Error, Result};
use crate::synthesis::{SpeakerId, SynthesisConfig, SynthesisEngine};

/// Outcome of a synthesis task, shared by every handle to it
pub type SpeechResult = std::result::Result<(), Arc<Error>>;

/// Completes when a synthesis task has produced all of its chunks,
/// including continuations merged into it.
#[derive(Clone)]
pub struct SpeechHandle {
    task_id: u64,
    inner: Shared<BoxFuture<'static, SpeechResult>>,
}

impl SpeechHandle {
    fn from_join(task_id: u64, join: JoinHandle<Result<()>>) -> Self {
        let inner = async move {
            match join.await {
                Ok(result) => result.map_err(Arc::new),
                Err(e) => Err(Arc::new(Error::from(e))),
            }
        }
        .boxed()
        .shared();

        Self { task_id, inner }
    }

    /// Identifies the synthesis task; merged submissions share it
    pub fn task_id(&self) -> u64 {
        self.task_id
    }
}

impl Future for SpeechHandle {
    type Output = SpeechResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl fmt::Debug for SpeechHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechHandle")
            .field("task_id", &self.task_id)
            .finish()
    }
}

type SharedEngine = Arc<Mutex<Box<dyn SynthesisEngine>>>;
type SharedScheduler = Arc<Mutex<TaskScheduler<SpeechHandle>>>;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Streams synthesized speech into a PCM buffer pulled by an audio device.
pub struct SpeechDriver {
    config: SpeakerConfig,
    format: SynthesisConfig,
    buffer: Arc<StreamingPcmBuffer>,
    engine: SharedEngine,
    scheduler: SharedScheduler,
    stopped: broadcast::Sender<PlaybackStopped>,
    runtime: Handle,
    clip: Option<OutputClip>,
}

impl SpeechDriver {
    /// Create a driver without an output device.
    ///
    /// Must be called from within a tokio runtime; synthesis tasks are
    /// spawned on its blocking pool. Use [`reader`](Self::reader) to pull audio.
    pub fn new<E>(engine: E, config: SpeakerConfig) -> Result<Self>
    where
        E: SynthesisEngine + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        Self::with_runtime(engine, config, runtime)
    }

    /// Create a driver that spawns synthesis on the given runtime
    pub fn with_runtime<E>(engine: E, config: SpeakerConfig, runtime: Handle) -> Result<Self>
    where
        E: SynthesisEngine + 'static,
    {
        config.validate()?;

        let mut engine: Box<dyn SynthesisEngine> = Box::new(engine);
        if let Some(speaker) = config.default_speaker {
            engine.set_speaker(speaker)?;
        }
        let format = engine.synthesis_config();
        let (stopped, _) = broadcast::channel(config.event_capacity);

        debug!(
            "Speech driver created ({} Hz, {} ch, buffer {})",
            format.sample_rate, format.channels, config.buffer_size
        );

        Ok(Self {
            config,
            format,
            buffer: Arc::new(StreamingPcmBuffer::new()),
            engine: Arc::new(Mutex::new(engine)),
            scheduler: Arc::new(Mutex::new(TaskScheduler::new())),
            stopped,
            runtime,
            clip: None,
        })
    }

    /// Create a driver and attach it to a host output clip
    pub fn with_output<E>(engine: E, config: SpeakerConfig, host: &dyn AudioHost) -> Result<Self>
    where
        E: SynthesisEngine + 'static,
    {
        let mut driver = Self::new(engine, config)?;
        driver.attach_output(host)?;
        Ok(driver)
    }

    /// Create a streaming clip on `host` that pulls from this driver's buffer.
    ///
    /// A previously attached clip is released first.
    pub fn attach_output(&mut self, host: &dyn AudioHost) -> Result<()> {
        if let Some(previous) = self.clip.take() {
            previous.release()?;
        }

        let spec = ClipSpec {
            name: DEFAULT_CLIP_NAME.to_string(),
            length_samples: self.config.clip_samples(),
            channels: self.format.channels,
            sample_rate: self.format.sample_rate,
            streaming: true,
        };
        self.clip = Some(OutputClip::create(host, spec, self.reader().into_callback())?);
        Ok(())
    }

    /// Interrupt current speech and say `text`.
    ///
    /// All buffered audio is discarded immediately. If `speaker` is given it
    /// is applied to the engine before `text` is synthesized.
    ///
    /// When a task is already running, `text` is queued behind its current
    /// pass and the returned handle is that task's. If the current pass
    /// fails, the queued `text` is discarded, the handle resolves to that
    /// pass's error, and the caller has to submit again.
    pub fn speak(&self, text: impl Into<String>, speaker: Option<SpeakerId>) -> SpeechHandle {
        self.submit(Submission::new(text, speaker), true)
    }

    /// Replace buffered audio with `text` without touching the speaker.
    ///
    /// Meant for streaming partial text: speak the first few tokens, then
    /// override with the longer, corrected text while it plays.
    pub fn override_speech(&self, text: impl Into<String>) -> SpeechHandle {
        self.submit(Submission::new(text, None), true)
    }

    /// Append `text` after the audio already queued.
    ///
    /// If a task is running, `text` becomes its pending continuation,
    /// replacing any continuation that has not started yet.
    pub fn continue_speech(&self, text: impl Into<String>) -> SpeechHandle {
        self.submit(Submission::new(text, None), false)
    }

    fn submit(&self, submission: Submission, reset: bool) -> SpeechHandle {
        let mut scheduler = lock(&self.scheduler);

        // Reset under the scheduler lock so a running task cannot pick up a
        // stale continuation between the reset and this submission.
        if reset {
            self.buffer.reset();
        }

        match scheduler.submit(submission) {
            Submit::Start(submission) => {
                let task_id = scheduler.tasks_started() + 1;
                let generation = self.buffer.generation();
                let handle = self.spawn_task(task_id, submission, generation);
                scheduler.started(handle.clone());
                handle
            }
            Submit::Merged(handle) => handle,
        }
    }

    fn spawn_task(&self, task_id: u64, first: Submission, generation: u64) -> SpeechHandle {
        debug!("Starting synthesis task {}", task_id);
        let worker = SynthesisWorker {
            task_id,
            buffer: Arc::clone(&self.buffer),
            engine: Arc::clone(&self.engine),
            scheduler: Arc::clone(&self.scheduler),
        };
        let join = self.runtime.spawn_blocking(move || worker.run(first, generation));
        SpeechHandle::from_join(task_id, join)
    }

    /// Real-time pull path for hosts wired by hand
    pub fn reader(&self) -> PcmReader {
        PcmReader::new(Arc::clone(&self.buffer), self.stopped.clone())
    }

    /// Subscribe to playback-stopped notifications
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackStopped> {
        self.stopped.subscribe()
    }

    /// Playback-stopped notifications as a stream; lagged notifications are skipped
    pub fn stopped_events(&self) -> impl Stream<Item = PlaybackStopped> + Send + 'static {
        BroadcastStream::new(self.stopped.subscribe()).filter_map(|event| event.ok())
    }

    /// Whether a synthesis task is running
    pub fn is_synthesizing(&self) -> bool {
        !lock(&self.scheduler).is_idle()
    }

    /// Handle of the running synthesis task, if any
    pub fn active_task(&self) -> Option<SpeechHandle> {
        lock(&self.scheduler).active().cloned()
    }

    pub fn stats(&self) -> BufferStats {
        self.buffer.stats()
    }

    /// Output format of the synthesis engine
    pub fn format(&self) -> SynthesisConfig {
        self.format
    }

    pub fn config(&self) -> &SpeakerConfig {
        &self.config
    }

    pub fn clip(&self) -> Option<&OutputClip> {
        self.clip.as_ref()
    }

    /// Release the output clip. Safe to call repeatedly or without a clip.
    pub fn shutdown(&self) -> Result<()> {
        if let Some(clip) = &self.clip {
            if clip.release()? {
                info!("Speech driver output released");
            }
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic");
    format!("engine panicked: {}", detail)
}

/// Runs synthesis passes until the scheduler has nothing pending.
///
/// A panicking engine is treated like a failed pass, so the scheduler always
/// returns to idle when the worker exits.
struct SynthesisWorker {
    task_id: u64,
    buffer: Arc<StreamingPcmBuffer>,
    engine: SharedEngine,
    scheduler: SharedScheduler,
}

impl SynthesisWorker {
    fn run(self, first: Submission, generation: u64) -> Result<()> {
        let mut engine = lock(&self.engine);
        let mut next = Some((first, generation));

        while let Some((submission, generation)) = next {
            let pass = panic::catch_unwind(AssertUnwindSafe(|| {
                self.synthesize(&mut **engine, &submission, generation)
            }))
            .unwrap_or_else(|payload| Err(Error::SynthesisError(panic_message(&*payload))));

            if let Err(e) = pass {
                let dropped = lock(&self.scheduler).abort();
                warn!(
                    "Synthesis task {} failed: {} (discarded pending: {})",
                    self.task_id,
                    e,
                    dropped.is_some()
                );
                return Err(e);
            }

            // Capture the generation under the scheduler lock; a reset must
            // come either before it (and is then honoured) or after it
            // (and then drops this pass's chunks).
            let mut scheduler = lock(&self.scheduler);
            next = scheduler
                .finish_pass()
                .map(|submission| (submission, self.buffer.generation()));
        }

        debug!("Synthesis task {} finished", self.task_id);
        Ok(())
    }

    fn synthesize(
        &self,
        engine: &mut dyn SynthesisEngine,
        submission: &Submission,
        generation: u64,
    ) -> Result<()> {
        if let Some(speaker) = submission.speaker {
            engine.set_speaker(speaker)?;
        }

        let mut appended = 0usize;
        let mut dropped = 0usize;
        engine.synthesize_to_stream(&submission.text, &mut |pcm: &[i16]| {
            if self
                .buffer
                .append_tagged(generation, SampleChunk::from_i16(pcm))
            {
                appended += 1;
            } else {
                dropped += 1;
            }
        })?;

        debug!(
            "Task {} synthesized {} chars: {} chunks appended, {} stale",
            self.task_id,
            submission.text.len(),
            appended,
            dropped
        );
        Ok(())
    }
}
