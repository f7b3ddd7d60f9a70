//! Grading poller — one bounded session per submission.
//!
//! DESIGN
//! ======
//! Each session owns a ticker and an attempt budget. The first probe fires
//! one full interval after spawn; a slow probe delays the next tick instead
//! of letting ticks pile up, so no two probes of one session ever run
//! concurrently.
//!
//! LIFECYCLE
//! =========
//! Idle until spawned, then Polling until exactly one terminal outcome:
//! the judge answered (`Resolved`), the budget ran out (`Exhausted`), or a
//! tick failed hard (`Aborted`). The outcome is published once on the event
//! channel. A cancelled session publishes nothing; it was superseded and its
//! submission no longer matters to anyone.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::graphql::{StatusProbe, SubmissionDetails, status_name};
use crate::message::{Credentials, ErrorCode};

// =============================================================================
// TYPES
// =============================================================================

/// Terminal result of one poll session.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// The judge answered; details carry the verdict.
    Resolved { details: SubmissionDetails },
    /// Budget spent without observing a verdict.
    Exhausted { attempts: u32 },
    /// A tick failed in a way another tick cannot fix.
    Aborted { error: String },
}

/// One terminal event per non-cancelled session.
#[derive(Debug, Clone, PartialEq)]
pub struct PollEvent {
    pub submission_id: u64,
    pub outcome: PollOutcome,
}

/// Running session handle. Dropping it does not stop the task; call
/// [`PollHandle::cancel`] to stop early.
pub struct PollHandle {
    pub submission_id: u64,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollHandle {
    /// Requests cooperative shutdown. An in-flight probe result is discarded
    /// and no event is published.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the session task to finish.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Spawns a poll session for one submission. Returns a handle the caller
/// cancels when a newer submission supersedes this one.
#[must_use]
pub fn spawn(
    probe: Arc<dyn StatusProbe>,
    submission_id: u64,
    credentials: Credentials,
    config: PollConfig,
    events: mpsc::Sender<PollEvent>,
) -> PollHandle {
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    let task = tokio::spawn(async move {
        let outcome =
            run_session(probe.as_ref(), submission_id, &credentials, config, &task_cancel).await;
        let Some(outcome) = outcome else {
            debug!(%submission_id, "poll session cancelled");
            return;
        };

        log_outcome(submission_id, &outcome);
        if events.send(PollEvent { submission_id, outcome }).await.is_err() {
            warn!(%submission_id, "poll event receiver dropped");
        }
    });

    PollHandle { submission_id, cancel, task }
}

/// Drives one session to its terminal outcome. `None` means cancelled.
async fn run_session(
    probe: &dyn StatusProbe,
    submission_id: u64,
    credentials: &Credentials,
    config: PollConfig,
    cancel: &CancellationToken,
) -> Option<PollOutcome> {
    let start = tokio::time::Instant::now();
    let mut ticker = tokio::time::interval_at(start + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut attempts = 0_u32;
    loop {
        tokio::select! {
            () = cancel.cancelled() => return None,
            _ = ticker.tick() => {}
        }

        let result = probe.probe(submission_id, credentials).await;
        if cancel.is_cancelled() {
            // Superseded mid-probe; discard the in-flight result.
            return None;
        }

        match result {
            Ok(details) => {
                if details.terminal_status().is_some() {
                    return Some(PollOutcome::Resolved { details });
                }
                attempts += 1;
                debug!(%submission_id, attempts, "grading not finished");
            }
            Err(e) if e.retryable() => {
                attempts += 1;
                warn!(%submission_id, attempts, code = e.error_code(), error = %e, "inconclusive probe");
            }
            Err(e) => return Some(PollOutcome::Aborted { error: e.to_string() }),
        }

        if attempts >= config.max_attempts {
            return Some(PollOutcome::Exhausted { attempts });
        }
    }
}

fn log_outcome(submission_id: u64, outcome: &PollOutcome) {
    match outcome {
        PollOutcome::Resolved { details } => {
            let code = details.status_code.unwrap_or_default();
            info!(
                %submission_id,
                status_code = code,
                status = status_name(code).unwrap_or("unknown"),
                "grading resolved"
            );
        }
        PollOutcome::Exhausted { attempts } => {
            info!(%submission_id, attempts, "poll budget exhausted");
        }
        PollOutcome::Aborted { error } => {
            warn!(%submission_id, %error, "poll session aborted");
        }
    }
}

#[cfg(test)]
#[path = "poll_test.rs"]
mod tests;
