//! Synthesis task scheduler.
//!
//! Keeps at most one synthesis task running per driver and at most one
//! pending continuation behind it:
//! - `Idle`: no task; the next submission starts one
//! - `Running`: a task is synthesizing; a submission becomes pending
//! - `RunningWithPending`: a further submission overwrites the pending one
//!
//! The running task consumes the pending submission when its pass finishes,
//! under the same lock submissions take, so a continuation arriving as the
//! task exits is either picked up by it or starts a fresh task, never both.

use tracing::debug;

use crate::synthesis::SpeakerId;

/// Text queued for synthesis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub text: String,
    /// Applied to the engine before this text is synthesized
    pub speaker: Option<SpeakerId>,
}

impl Submission {
    pub fn new(text: impl Into<String>, speaker: Option<SpeakerId>) -> Self {
        Self {
            text: text.into(),
            speaker,
        }
    }

    /// Last write wins for the text; a speaker override survives being overwritten.
    fn superseded_by(self, newer: Submission) -> Submission {
        Submission {
            text: newer.text,
            speaker: newer.speaker.or(self.speaker),
        }
    }
}

/// Scheduler state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TaskState {
    #[default]
    Idle,
    Running,
    RunningWithPending(Submission),
}

/// Outcome of a submission
#[derive(Debug, PartialEq, Eq)]
pub enum Submit<H> {
    /// No task was running; the caller must spawn one for this submission
    /// and register it with [`TaskScheduler::started`].
    Start(Submission),
    /// Merged into the running task, which will synthesize it next.
    Merged(H),
}

/// At-most-one-task state machine, generic over the task handle type.
#[derive(Debug)]
pub struct TaskScheduler<H> {
    state: TaskState,
    active: Option<H>,
    tasks_started: u64,
}

impl<H> Default for TaskScheduler<H> {
    fn default() -> Self {
        Self {
            state: TaskState::Idle,
            active: None,
            tasks_started: 0,
        }
    }
}

impl<H: Clone> TaskScheduler<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a submission to a new task or the running one.
    pub fn submit(&mut self, submission: Submission) -> Submit<H> {
        let state = std::mem::take(&mut self.state);
        let handle = match (&state, self.active.clone()) {
            (TaskState::Idle, _) | (_, None) => {
                self.state = TaskState::Running;
                return Submit::Start(submission);
            }
            (_, Some(handle)) => handle,
        };

        let (pending, replaced_pending) = match state {
            TaskState::RunningWithPending(previous) => (previous.superseded_by(submission), true),
            _ => (submission, false),
        };
        debug!(
            "Queued continuation ({} chars), replaced pending: {}",
            pending.text.len(),
            replaced_pending
        );
        self.state = TaskState::RunningWithPending(pending);

        Submit::Merged(handle)
    }

    /// Register the handle of a task spawned for [`Submit::Start`].
    pub fn started(&mut self, handle: H) {
        self.active = Some(handle);
        self.tasks_started += 1;
    }

    /// Called by the running task after each pass. Returns the next
    /// submission to synthesize, or `None` once the scheduler is idle.
    pub fn finish_pass(&mut self) -> Option<Submission> {
        match std::mem::take(&mut self.state) {
            TaskState::RunningWithPending(next) => {
                self.state = TaskState::Running;
                Some(next)
            }
            _ => {
                self.active = None;
                None
            }
        }
    }

    /// Called by the running task when a pass fails. Goes idle and returns
    /// the discarded pending submission, if any.
    pub fn abort(&mut self) -> Option<Submission> {
        self.active = None;
        match std::mem::take(&mut self.state) {
            TaskState::RunningWithPending(dropped) => Some(dropped),
            _ => None,
        }
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    /// Handle of the running task, if any
    pub fn active(&self) -> Option<&H> {
        self.active.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.state == TaskState::Idle
    }

    /// Number of tasks spawned so far
    pub fn tasks_started(&self) -> u64 {
        self.tasks_started
    }
}
