//! Single-worker processing queue.
//!
//! Owns a FIFO of pending jobs and at most one active job. Jobs run one at a
//! time on a blocking worker task; submission and observer management never
//! wait on inference. Every state change is broadcast as a consistent
//! snapshot, per-job observers additionally receive the job's progress
//! stream. Whatever way the active job exits (completion, cancellation,
//! failure, panic), the active slot is cleared and the next pending job is
//! promoted.

mod job;

pub use job::{ActiveJob, Job, JobKind, QueueEvent, QueueSnapshot};

use crate::error::Error;
use crate::pipeline::{CancelFlag, JobResult, Pipeline};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Capacity of the general observer broadcast channel. A slow observer that
/// lags past this many events misses the older ones; the next snapshot
/// resynchronizes it.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The job processing queue.
pub struct ProcessingQueue {
    state: Mutex<QueueState>,
    events: broadcast::Sender<QueueEvent>,
    pipeline: Arc<Pipeline>,
    runtime: tokio::runtime::Handle,
}

/// Mutable queue state. Mutated only by the control path (`submit`,
/// `cancel`, observer registration) and the worker exit path, always under
/// the one lock, so observers only ever see consistent snapshots.
struct QueueState {
    pending: VecDeque<Job>,
    active: Option<ActiveEntry>,
    job_observers: HashMap<String, Vec<mpsc::UnboundedSender<QueueEvent>>>,
}

struct ActiveEntry {
    job: Job,
    progress: f32,
    status: String,
    cancel: CancelFlag,
}

impl ActiveEntry {
    fn snapshot(&self) -> ActiveJob {
        ActiveJob {
            recording_id: self.job.recording_id.clone(),
            kind: self.job.kind,
            progress: self.progress,
            status: self.status.clone(),
        }
    }
}

impl ProcessingQueue {
    /// Create a queue around a pipeline.
    ///
    /// Must be called within a tokio runtime; worker tasks are spawned onto
    /// it.
    pub fn new(pipeline: Arc<Pipeline>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                active: None,
                job_observers: HashMap::new(),
            }),
            events,
            pipeline,
            runtime: tokio::runtime::Handle::current(),
        })
    }

    /// Submit a job. It starts immediately when the queue is idle, otherwise
    /// it waits in FIFO order.
    pub fn submit(self: &Arc<Self>, job: Job) {
        let mut state = self.lock_state();
        info!(
            recording_id = %job.recording_id,
            kind = %job.kind,
            queued = state.pending.len(),
            "job submitted"
        );
        state.pending.push_back(job);
        self.broadcast_snapshot(&state);
        self.advance(&mut state);
    }

    /// Cancel a job by recording id.
    ///
    /// An active job is signalled cooperatively and keeps the active slot
    /// until its worker observes the flag; its terminal status will be
    /// "cancelled". A pending job is removed from the FIFO directly.
    /// Cancelling an unknown or already-finished job is a no-op.
    pub fn cancel(&self, recording_id: &str) {
        let mut state = self.lock_state();

        if let Some(active) = state.active.as_ref()
            && active.job.recording_id == recording_id
        {
            info!(recording_id, "cancelling active job");
            active.cancel.cancel();
            return;
        }

        let before = state.pending.len();
        state.pending.retain(|job| job.recording_id != recording_id);
        if state.pending.len() != before {
            info!(recording_id, "removed pending job");
            self.broadcast_snapshot(&state);
        }
    }

    /// Subscribe as a general observer. The current snapshot is broadcast
    /// immediately so the new observer starts consistent.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        let state = self.lock_state();
        let receiver = self.events.subscribe();
        self.broadcast_snapshot(&state);
        receiver
    }

    /// Watch a single job's progress stream.
    ///
    /// If the job is already active its current progress is replayed
    /// immediately.
    pub fn watch_job(&self, recording_id: &str) -> mpsc::UnboundedReceiver<QueueEvent> {
        let mut state = self.lock_state();
        let (sender, receiver) = mpsc::unbounded_channel();

        if let Some(active) = state.active.as_ref()
            && active.job.recording_id == recording_id
        {
            let _ = sender.send(QueueEvent::Progress(active.snapshot()));
        }

        state
            .job_observers
            .entry(recording_id.to_string())
            .or_default()
            .push(sender);
        receiver
    }

    /// Stop watching a job. Idempotent.
    pub fn unwatch_job(&self, recording_id: &str) {
        self.lock_state().job_observers.remove(recording_id);
    }

    /// Current queue snapshot.
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.lock_state();
        QueueSnapshot {
            processing: state.active.as_ref().map(ActiveEntry::snapshot),
            queue: state.pending.iter().cloned().collect(),
        }
    }

    /// Promote the head of the FIFO when the active slot is free.
    fn advance(self: &Arc<Self>, state: &mut MutexGuard<'_, QueueState>) {
        if state.active.is_some() {
            return;
        }
        let Some(job) = state.pending.pop_front() else {
            return;
        };

        let cancel = CancelFlag::new();
        state.active = Some(ActiveEntry {
            job: job.clone(),
            progress: 0.0,
            status: "Not started".to_string(),
            cancel: cancel.clone(),
        });
        self.broadcast_snapshot(state);
        self.start_worker(job, cancel);
    }

    /// Run a job on a dedicated blocking task, isolated from the control
    /// path.
    fn start_worker(self: &Arc<Self>, job: Job, cancel: CancelFlag) {
        let queue = Arc::clone(self);
        self.runtime.spawn(async move {
            let pipeline = Arc::clone(&queue.pipeline);
            let worker_job = job.clone();
            let progress_queue = Arc::clone(&queue);

            let outcome = tokio::task::spawn_blocking(move || {
                let progress = |percent: f32, status: &str| {
                    progress_queue.report_progress(&worker_job.recording_id, percent, status);
                };
                match worker_job.kind {
                    JobKind::DetectEvents => {
                        pipeline.detect_events(&worker_job.recording_id, &cancel, progress)
                    }
                    JobKind::ClassifySpecies => {
                        pipeline.classify_species(&worker_job.recording_id, &cancel, progress)
                    }
                }
            })
            .await;

            // A panicking worker must not leave the active slot occupied.
            let outcome = outcome.unwrap_or_else(|join_error| {
                Err(Error::Internal {
                    message: format!("worker task failed: {join_error}"),
                })
            });
            queue.finish_job(&job, outcome);
        });
    }

    /// Worker-side progress update: mutate the active record and notify both
    /// observer groups.
    fn report_progress(&self, recording_id: &str, progress: f32, status: &str) {
        let mut state = self.lock_state();
        let Some(active) = state.active.as_mut() else {
            return;
        };
        if active.job.recording_id != recording_id {
            return;
        }

        active.progress = progress;
        active.status = status.to_string();
        let event = QueueEvent::Progress(active.snapshot());

        self.broadcast_snapshot(&state);
        Self::notify_job_observers(&mut state, recording_id, &event);
    }

    /// Terminal handling for the active job: emit the terminal event, clear
    /// the slot and unconditionally try to start the next pending job.
    fn finish_job(self: &Arc<Self>, job: &Job, outcome: crate::error::Result<JobResult>) {
        let mut state = self.lock_state();

        let terminal = match outcome {
            Ok(result) => {
                info!(recording_id = %job.recording_id, "job completed");
                QueueEvent::Complete {
                    recording_id: job.recording_id.clone(),
                    result,
                }
            }
            // Cancellation is user-initiated, not a failure.
            Err(Error::Cancelled) => {
                info!(recording_id = %job.recording_id, "job cancelled");
                QueueEvent::Progress(ActiveJob {
                    recording_id: job.recording_id.clone(),
                    kind: job.kind,
                    progress: 100.0,
                    status: "cancelled".to_string(),
                })
            }
            Err(e) => {
                warn!(recording_id = %job.recording_id, error = %e, "job failed");
                QueueEvent::Error {
                    recording_id: job.recording_id.clone(),
                    code: e.code().to_string(),
                    description: e.to_string(),
                    status: e.status_code(),
                }
            }
        };

        let _ = self.events.send(terminal.clone());
        Self::notify_job_observers(&mut state, &job.recording_id, &terminal);
        state.job_observers.remove(&job.recording_id);

        state.active = None;
        self.broadcast_snapshot(&state);
        self.advance(&mut state);
    }

    /// Send the current snapshot to all general observers.
    fn broadcast_snapshot(&self, state: &QueueState) {
        let snapshot = QueueSnapshot {
            processing: state.active.as_ref().map(ActiveEntry::snapshot),
            queue: state.pending.iter().cloned().collect(),
        };
        // No receivers is fine; a lagging receiver drops old events.
        let _ = self.events.send(QueueEvent::Snapshot(snapshot));
    }

    /// Send an event to every observer of one job, dropping observers whose
    /// receiver is gone.
    fn notify_job_observers(
        state: &mut MutexGuard<'_, QueueState>,
        recording_id: &str,
        event: &QueueEvent,
    ) {
        if let Some(observers) = state.job_observers.get_mut(recording_id) {
            observers.retain(|sender| {
                let delivered = sender.send(event.clone()).is_ok();
                if !delivered {
                    debug!(recording_id, "dropping disconnected job observer");
                }
                delivered
            });
        }
    }

    #[allow(clippy::unwrap_used)]
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        // Holders never panic while holding the lock.
        self.state.lock().unwrap()
    }
}
