use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::*;
use crate::graphql::{STATUS_GRADING, SiteError};

fn grading() -> SubmissionDetails {
    SubmissionDetails { status_code: Some(STATUS_GRADING), ..SubmissionDetails::default() }
}

fn accepted() -> SubmissionDetails {
    SubmissionDetails {
        status_code: Some(10),
        runtime_display: Some("4 ms".into()),
        ..SubmissionDetails::default()
    }
}

fn creds() -> Credentials {
    Credentials { csrf: "c".into(), session: "s".into() }
}

fn fast(max_attempts: u32) -> PollConfig {
    PollConfig { interval: Duration::from_millis(5), max_attempts }
}

/// Replays a script, then reports "still grading" forever.
struct ScriptedProbe {
    calls: AtomicU32,
    script: Mutex<VecDeque<Result<SubmissionDetails, SiteError>>>,
}

impl ScriptedProbe {
    fn grading_forever() -> Self {
        Self::with_script(Vec::new())
    }

    fn with_script(steps: Vec<Result<SubmissionDetails, SiteError>>) -> Self {
        Self { calls: AtomicU32::new(0), script: Mutex::new(steps.into_iter().collect()) }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProbe for ScriptedProbe {
    async fn probe(
        &self,
        _submission_id: u64,
        _credentials: &Credentials,
    ) -> Result<SubmissionDetails, SiteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(step) => step,
            None => Ok(grading()),
        }
    }
}

#[tokio::test]
async fn never_resolving_spends_exactly_the_budget() {
    let probe = Arc::new(ScriptedProbe::grading_forever());
    let (tx, mut rx) = mpsc::channel(4);

    let handle = spawn(probe.clone(), 42, creds(), fast(6), tx);
    handle.join().await;

    assert_eq!(probe.calls(), 6);
    let event = rx.recv().await.expect("terminal event");
    assert_eq!(event.submission_id, 42);
    assert!(matches!(event.outcome, PollOutcome::Exhausted { attempts: 6 }));
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn absent_status_is_inconclusive() {
    let probe = Arc::new(ScriptedProbe::with_script(vec![Ok(SubmissionDetails::default())]));
    let (tx, mut rx) = mpsc::channel(4);

    let handle = spawn(probe.clone(), 5, creds(), fast(2), tx);
    handle.join().await;

    assert_eq!(probe.calls(), 2);
    assert!(matches!(
        rx.recv().await.expect("event").outcome,
        PollOutcome::Exhausted { attempts: 2 }
    ));
}

#[tokio::test]
async fn resolves_at_attempt_k_and_stops() {
    let probe = Arc::new(ScriptedProbe::with_script(vec![
        Ok(grading()),
        Ok(grading()),
        Ok(accepted()),
    ]));
    let (tx, mut rx) = mpsc::channel(4);

    let handle = spawn(probe.clone(), 7, creds(), fast(6), tx);
    handle.join().await;

    assert_eq!(probe.calls(), 3);
    let event = rx.recv().await.expect("terminal event");
    assert!(matches!(
        event.outcome,
        PollOutcome::Resolved { ref details } if details.status_code == Some(10)
    ));
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn resolution_on_final_attempt_beats_the_budget() {
    let probe = Arc::new(ScriptedProbe::with_script(vec![
        Ok(grading()),
        Ok(grading()),
        Ok(accepted()),
    ]));
    let (tx, mut rx) = mpsc::channel(4);

    let handle = spawn(probe.clone(), 8, creds(), fast(3), tx);
    handle.join().await;

    assert_eq!(probe.calls(), 3);
    assert!(matches!(rx.recv().await.expect("event").outcome, PollOutcome::Resolved { .. }));
}

#[tokio::test]
async fn http_status_failures_count_against_budget() {
    let probe = Arc::new(ScriptedProbe::with_script(vec![
        Err(SiteError::Status { status: 502, body: "bad gateway".into() }),
        Err(SiteError::Status { status: 403, body: String::new() }),
    ]));
    let (tx, mut rx) = mpsc::channel(4);

    let handle = spawn(probe.clone(), 9, creds(), fast(2), tx);
    handle.join().await;

    assert_eq!(probe.calls(), 2);
    assert!(matches!(
        rx.recv().await.expect("event").outcome,
        PollOutcome::Exhausted { attempts: 2 }
    ));
}

#[tokio::test]
async fn send_failure_aborts_immediately() {
    let probe = Arc::new(ScriptedProbe::with_script(vec![Err(SiteError::Request(
        "connection reset".into(),
    ))]));
    let (tx, mut rx) = mpsc::channel(4);

    let handle = spawn(probe.clone(), 11, creds(), fast(6), tx);
    handle.join().await;

    assert_eq!(probe.calls(), 1);
    let event = rx.recv().await.expect("event");
    assert!(matches!(
        event.outcome,
        PollOutcome::Aborted { ref error } if error.contains("connection reset")
    ));
}

#[tokio::test]
async fn parse_failure_aborts() {
    let probe = Arc::new(ScriptedProbe::with_script(vec![Err(SiteError::Parse(
        "expected value".into(),
    ))]));
    let (tx, mut rx) = mpsc::channel(4);

    let handle = spawn(probe.clone(), 12, creds(), fast(6), tx);
    handle.join().await;

    assert_eq!(probe.calls(), 1);
    assert!(matches!(rx.recv().await.expect("event").outcome, PollOutcome::Aborted { .. }));
}

#[tokio::test]
async fn cancelled_session_probes_nothing_and_stays_silent() {
    let probe = Arc::new(ScriptedProbe::grading_forever());
    let (tx, mut rx) = mpsc::channel(4);

    let config = PollConfig { interval: Duration::from_secs(30), max_attempts: 6 };
    let handle = spawn(probe.clone(), 13, creds(), config, tx);
    handle.cancel();
    handle.join().await;

    assert_eq!(probe.calls(), 0);
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn first_probe_waits_one_full_interval() {
    let probe = Arc::new(ScriptedProbe::grading_forever());
    let (tx, _rx) = mpsc::channel(4);

    let config = PollConfig { interval: Duration::from_millis(200), max_attempts: 1 };
    let handle = spawn(probe.clone(), 17, creds(), config, tx);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(probe.calls(), 0);

    handle.join().await;
    assert_eq!(probe.calls(), 1);
}
