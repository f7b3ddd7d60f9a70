//! Submission relay — inbound side of the watcher boundary.
//!
//! DESIGN
//! ======
//! The relay is the only consumer of the wire channel. Every inbound value
//! goes through the codec; a bad message is logged and dropped without
//! touching relay state, so one garbage frame can never wedge the listener.
//!
//! At most one poll session is live. A new submission id cancels the old
//! session before spawning its replacement; only the latest submission
//! matters to the panel, so a superseded session's outcome is never
//! published.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::PollConfig;
use crate::graphql::StatusProbe;
use crate::message::{ErrorCode, MessageError, SubmissionMessage};
use crate::services::poll::{self, PollEvent, PollHandle};

/// What a well-formed inbound message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// A poll session was started, cancelling `replaced` if present.
    Started { submission_id: u64, replaced: Option<u64> },
    /// Same id as the previous message; the live session keeps running.
    Duplicate(u64),
}

pub struct SubmissionRelay {
    probe: Arc<dyn StatusProbe>,
    config: PollConfig,
    events: mpsc::Sender<PollEvent>,
    previous_id: Option<u64>,
    active: Option<PollHandle>,
}

impl SubmissionRelay {
    #[must_use]
    pub fn new(
        probe: Arc<dyn StatusProbe>,
        config: PollConfig,
        events: mpsc::Sender<PollEvent>,
    ) -> Self {
        Self { probe, config, events, previous_id: None, active: None }
    }

    /// Id of the submission whose session is currently live.
    #[must_use]
    pub fn active_submission(&self) -> Option<u64> {
        self.active.as_ref().map(|handle| handle.submission_id)
    }

    /// Handles one wire value.
    ///
    /// # Errors
    /// Codec failures. Relay state is untouched on error; callers log and
    /// keep listening.
    pub fn handle_message(
        &mut self,
        raw: &serde_json::Value,
    ) -> Result<RelayOutcome, MessageError> {
        let message = SubmissionMessage::decode(raw)?;
        let submission_id = message.submission_id;

        if self.previous_id == Some(submission_id) {
            return Ok(RelayOutcome::Duplicate(submission_id));
        }

        let replaced = self.active.take().map(|handle| {
            handle.cancel();
            handle.submission_id
        });

        self.previous_id = Some(submission_id);
        self.active = Some(poll::spawn(
            self.probe.clone(),
            submission_id,
            message.credentials,
            self.config,
            self.events.clone(),
        ));

        Ok(RelayOutcome::Started { submission_id, replaced })
    }

    /// Listener loop. Ends when every wire sender is dropped.
    pub async fn run(mut self, mut rx: mpsc::Receiver<serde_json::Value>) {
        while let Some(raw) = rx.recv().await {
            match self.handle_message(&raw) {
                Ok(RelayOutcome::Started { submission_id, replaced: Some(old) }) => {
                    info!(%submission_id, superseded = old, "relay: poll session replaced");
                }
                Ok(RelayOutcome::Started { submission_id, replaced: None }) => {
                    info!(%submission_id, "relay: poll session started");
                }
                Ok(RelayOutcome::Duplicate(submission_id)) => {
                    debug!(%submission_id, "relay: duplicate submission ignored");
                }
                Err(e) => {
                    warn!(code = e.error_code(), error = %e, "relay: dropping bad message");
                }
            }
        }
        info!("relay: wire channel closed, shutting down");
    }
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
