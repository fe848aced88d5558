//! Integration tests for the processing queue: ordering, cancellation and
//! observer notification guarantees.

use mozzdet::config::{Config, OutputConfig};
use mozzdet::inference::{ClassProbs, InferenceModel};
use mozzdet::pipeline::Pipeline;
use mozzdet::queue::{Job, ProcessingQueue, QueueEvent};
use mozzdet::storage::{Recording, RecordingSource};
use mozzdet::{DetectionConfig, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

/// Detector that reports absence for every window, optionally sleeping per
/// batch so tests can cancel mid-job.
struct SlowDetector {
    delay: Duration,
    calls: AtomicUsize,
}

impl SlowDetector {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }
}

impl InferenceModel for SlowDetector {
    fn classify(&self, batch: &[&[f32]]) -> Result<Vec<ClassProbs>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(batch
            .iter()
            .map(|_| {
                ClassProbs::from([("0".to_string(), 0.9_f32), ("1".to_string(), 0.1_f32)])
            })
            .collect())
    }

    fn checkpoint(&self) -> &str {
        "slow-med.ckpt"
    }
}

/// Species model that should never run in these tests.
struct UnusedClassifier;

impl InferenceModel for UnusedClassifier {
    fn classify(&self, _batch: &[&[f32]]) -> Result<Vec<ClassProbs>> {
        panic!("species classifier should not be invoked");
    }

    fn checkpoint(&self) -> &str {
        "unused-msc.ckpt"
    }
}

/// In-memory recording source.
struct MemorySource {
    recordings: HashMap<String, Recording>,
}

impl MemorySource {
    fn with_recordings(ids: &[&str], windows: usize) -> Self {
        let config = DetectionConfig::default();
        let len = config.single_batch_length() + (windows - 1) * config.step_samples();
        let recordings = ids
            .iter()
            .map(|&id| {
                (
                    id.to_string(),
                    Recording {
                        id: id.to_string(),
                        samples: vec![0.01; len],
                        sample_rate: config.sample_rate,
                        recorded_at: None,
                    },
                )
            })
            .collect();
        Self { recordings }
    }
}

impl RecordingSource for MemorySource {
    fn fetch(&self, id: &str) -> Result<Recording> {
        self.recordings
            .get(id)
            .cloned()
            .ok_or_else(|| mozzdet::Error::RecordingNotFound { id: id.to_string() })
    }
}

fn test_queue(source: MemorySource, delay: Duration) -> Arc<ProcessingQueue> {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config {
        output: OutputConfig {
            dir: dir.keep(),
        },
        ..Config::default()
    };
    let pipeline = Pipeline::new(
        Arc::new(SlowDetector::new(delay)),
        Arc::new(UnusedClassifier),
        Arc::new(source),
        config,
    );
    ProcessingQueue::new(Arc::new(pipeline))
}

async fn next_event(receiver: &mut broadcast::Receiver<QueueEvent>) -> QueueEvent {
    loop {
        match timeout(Duration::from_secs(10), receiver.recv()).await {
            Ok(Ok(event)) => return event,
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => {}
            other => panic!("no event within timeout: {other:?}"),
        }
    }
}

/// Collect terminal events (Complete / Error / cancelled Progress) until
/// `count` have arrived.
async fn collect_terminals(
    receiver: &mut broadcast::Receiver<QueueEvent>,
    count: usize,
) -> Vec<QueueEvent> {
    let mut terminals = Vec::new();
    while terminals.len() < count {
        match next_event(receiver).await {
            event @ (QueueEvent::Complete { .. } | QueueEvent::Error { .. }) => {
                terminals.push(event);
            }
            QueueEvent::Progress(active) if active.status == "cancelled" => {
                terminals.push(QueueEvent::Progress(active));
            }
            _ => {}
        }
    }
    terminals
}

fn terminal_id(event: &QueueEvent) -> &str {
    match event {
        QueueEvent::Complete { recording_id, .. }
        | QueueEvent::Error { recording_id, .. } => recording_id,
        QueueEvent::Progress(active) => &active.recording_id,
        QueueEvent::Snapshot(_) => panic!("snapshot is not terminal"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_jobs_complete_in_submission_order() {
    let queue = test_queue(
        MemorySource::with_recordings(&["a", "b", "c"], 6),
        Duration::ZERO,
    );
    let mut events = queue.subscribe();

    queue.submit(Job::detect_events("a"));
    queue.submit(Job::detect_events("b"));
    queue.submit(Job::detect_events("c"));

    let terminals = collect_terminals(&mut events, 3).await;
    let ids: Vec<&str> = terminals.iter().map(terminal_id).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    for event in &terminals {
        assert!(matches!(event, QueueEvent::Complete { .. }));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_snapshots_never_show_more_than_one_active_job() {
    let queue = test_queue(
        MemorySource::with_recordings(&["a", "b"], 6),
        Duration::from_millis(5),
    );
    let mut events = queue.subscribe();

    queue.submit(Job::detect_events("a"));
    queue.submit(Job::detect_events("b"));

    let mut completed = 0;
    while completed < 2 {
        match next_event(&mut events).await {
            QueueEvent::Snapshot(snapshot) => {
                // The snapshot type can only hold one active job; the queued
                // list must never contain the active one.
                if let Some(active) = &snapshot.processing {
                    assert!(
                        snapshot
                            .queue
                            .iter()
                            .all(|job| job.recording_id != active.recording_id)
                    );
                }
            }
            QueueEvent::Complete { .. } => completed += 1,
            _ => {}
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_active_job_reports_cancelled_and_advances() {
    let queue = test_queue(
        MemorySource::with_recordings(&["a", "b"], 20),
        Duration::from_millis(25),
    );
    let mut events = queue.subscribe();
    let mut job_events = queue.watch_job("a");

    queue.submit(Job::detect_events("a"));
    queue.submit(Job::detect_events("b"));

    tokio::time::sleep(Duration::from_millis(60)).await;
    queue.cancel("a");

    let terminals = collect_terminals(&mut events, 2).await;
    assert_eq!(terminal_id(&terminals[0]), "a");
    assert!(
        matches!(&terminals[0], QueueEvent::Progress(active) if active.status == "cancelled"),
        "active job must terminate as cancelled, got {:?}",
        terminals[0]
    );
    assert!(matches!(&terminals[1], QueueEvent::Complete { recording_id, .. } if recording_id == "b"));

    // The job observer sees exactly one cancelled terminal.
    let mut cancelled = 0;
    while let Ok(event) = job_events.try_recv() {
        if matches!(&event, QueueEvent::Progress(active) if active.status == "cancelled") {
            cancelled += 1;
        }
    }
    assert_eq!(cancelled, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_pending_job_removes_it() {
    let queue = test_queue(
        MemorySource::with_recordings(&["a", "b", "c"], 12),
        Duration::from_millis(20),
    );
    let mut events = queue.subscribe();

    queue.submit(Job::detect_events("a"));
    queue.submit(Job::detect_events("b"));
    queue.submit(Job::detect_events("c"));
    queue.cancel("b");

    let terminals = collect_terminals(&mut events, 2).await;
    let ids: Vec<&str> = terminals.iter().map(terminal_id).collect();
    assert_eq!(ids, vec!["a", "c"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_unknown_job_is_a_noop() {
    let queue = test_queue(MemorySource::with_recordings(&["a"], 6), Duration::ZERO);
    let mut events = queue.subscribe();

    queue.cancel("ghost");
    queue.submit(Job::detect_events("a"));
    queue.cancel("a-finished-long-ago");

    let terminals = collect_terminals(&mut events, 1).await;
    assert_eq!(terminal_id(&terminals[0]), "a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_job_reports_error_and_queue_advances() {
    let queue = test_queue(MemorySource::with_recordings(&["b"], 6), Duration::ZERO);
    let mut events = queue.subscribe();

    queue.submit(Job::detect_events("missing"));
    queue.submit(Job::detect_events("b"));

    let terminals = collect_terminals(&mut events, 2).await;
    match &terminals[0] {
        QueueEvent::Error {
            recording_id,
            code,
            status,
            ..
        } => {
            assert_eq!(recording_id, "missing");
            assert_eq!(code, "recording_not_found");
            assert_eq!(*status, 404);
        }
        other => panic!("expected error terminal, got {other:?}"),
    }
    assert!(matches!(&terminals[1], QueueEvent::Complete { recording_id, .. } if recording_id == "b"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_job_observer_sees_second_job_only_after_first_terminal() {
    let queue = test_queue(
        MemorySource::with_recordings(&["a", "b"], 8),
        Duration::from_millis(10),
    );
    let mut events = queue.subscribe();

    queue.submit(Job::detect_events("a"));
    queue.submit(Job::detect_events("b"));

    // Scan the general stream: job b must not appear as active in any
    // snapshot before a's terminal event.
    let mut a_finished = false;
    loop {
        match next_event(&mut events).await {
            QueueEvent::Complete { recording_id, .. } if recording_id == "a" => {
                a_finished = true;
            }
            QueueEvent::Complete { recording_id, .. } if recording_id == "b" => break,
            QueueEvent::Snapshot(snapshot) => {
                if let Some(active) = &snapshot.processing
                    && active.recording_id == "b"
                {
                    assert!(a_finished, "job b became active before job a finished");
                }
            }
            _ => {}
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_watch_job_replays_progress_for_active_job() {
    let queue = test_queue(
        MemorySource::with_recordings(&["a"], 20),
        Duration::from_millis(25),
    );

    queue.submit(Job::detect_events("a"));
    tokio::time::sleep(Duration::from_millis(60)).await;

    // Late subscriber to an already-running job gets its state right away.
    let mut job_events = queue.watch_job("a");
    let first = timeout(Duration::from_secs(1), job_events.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert!(matches!(&first, QueueEvent::Progress(active) if active.recording_id == "a"));

    queue.cancel("a");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dropped_job_observer_does_not_break_the_queue() {
    let queue = test_queue(MemorySource::with_recordings(&["a"], 6), Duration::ZERO);
    let mut events = queue.subscribe();

    let job_events = queue.watch_job("a");
    drop(job_events);

    queue.submit(Job::detect_events("a"));
    let terminals = collect_terminals(&mut events, 1).await;
    assert!(matches!(&terminals[0], QueueEvent::Complete { .. }));
}
