//! Submission watcher — outbound side of the boundary.
//!
//! SYSTEM CONTEXT
//! ==============
//! Sits where the traffic interceptor hands over: every captured URL is
//! offered to `handle_request`. The watcher filters submission traffic,
//! pulls the two session cookies, and ships one message per new submission
//! through the sink.
//!
//! DESIGN
//! ======
//! The dedup marker commits only after the sink acknowledges delivery. A
//! discarded event (missing cookie) or a failed delivery leaves the marker
//! untouched, so the same submission is retried when its URL fires again;
//! the relay's own dedup absorbs any resulting duplicates.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SiteConfig;
use crate::message::{Credentials, ErrorCode, SubmissionMessage};

// =============================================================================
// SEAMS
// =============================================================================

/// Cookie lookup for the site origin. Async because real jars live on disk
/// or behind IPC.
#[async_trait]
pub trait CookieJar: Send + Sync {
    async fn get(&self, name: &str) -> Option<String>;
}

/// Delivery of wire values to the peer context.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Hands one wire value to the peer; `Ok` means the peer accepted it.
    ///
    /// # Errors
    ///
    /// Returns a [`SinkError`] when no peer is listening.
    async fn deliver(&self, wire: serde_json::Value) -> Result<(), SinkError>;
}

#[derive(Debug, thiserror::Error)]
#[error("message delivery failed: {0}")]
pub struct SinkError(pub String);

impl ErrorCode for SinkError {
    fn error_code(&self) -> &'static str {
        "E_SINK_DELIVERY"
    }

    /// Delivery is retried when the same submission URL fires again.
    fn retryable(&self) -> bool {
        true
    }
}

/// Sink over the in-process wire channel.
pub struct ChannelSink {
    tx: mpsc::Sender<serde_json::Value>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: mpsc::Sender<serde_json::Value>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn deliver(&self, wire: serde_json::Value) -> Result<(), SinkError> {
        self.tx.send(wire).await.map_err(|_| SinkError("wire channel closed".into()))
    }
}

/// Jar backed by a JSON object of name/value pairs, re-read per lookup so a
/// refreshed session is picked up without a restart.
pub struct FileCookieJar {
    path: PathBuf,
}

impl FileCookieJar {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CookieJar for FileCookieJar {
    async fn get(&self, name: &str) -> Option<String> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cookie file unreadable");
                return None;
            }
        };
        let values: HashMap<String, String> = match serde_json::from_str(&raw) {
            Ok(values) => values,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cookie file is not a name/value object");
                return None;
            }
        };
        values.get(name).cloned()
    }
}

// =============================================================================
// URL PARSING
// =============================================================================

/// Extracts the submission id from an intercepted URL: path token 5 of the
/// grading-check shape `https://<site>/submissions/detail/<id>/check/`.
/// Anything but a full integer token is `None`, never zero.
#[must_use]
pub fn extract_submission_id(url: &str) -> Option<u64> {
    url.split('/').nth(5).and_then(|token| token.parse().ok())
}

// =============================================================================
// WATCHER
// =============================================================================

/// What one intercepted URL produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Sink acknowledged; the dedup marker now holds this id.
    Delivered(u64),
    /// Same id as the last delivered message.
    Duplicate(u64),
    /// URL is outside the submissions prefix.
    NotSubmission,
    /// Submission segment missing or not an integer.
    NoSubmissionId,
    /// Named cookie absent; event discarded, marker untouched.
    MissingCredential(String),
    /// Sink refused the message; marker untouched so a refire retries.
    DeliveryFailed(u64),
}

pub struct SubmissionWatcher {
    prefix: String,
    csrf_cookie: String,
    session_cookie: String,
    jar: Arc<dyn CookieJar>,
    sink: Arc<dyn MessageSink>,
    last_sent: Option<u64>,
}

impl SubmissionWatcher {
    #[must_use]
    pub fn new(config: &SiteConfig, jar: Arc<dyn CookieJar>, sink: Arc<dyn MessageSink>) -> Self {
        Self {
            prefix: config.submissions_prefix(),
            csrf_cookie: config.csrf_cookie.clone(),
            session_cookie: config.session_cookie.clone(),
            jar,
            sink,
            last_sent: None,
        }
    }

    /// Processes one intercepted URL end to end.
    pub async fn handle_request(&mut self, url: &str) -> WatchOutcome {
        if !url.starts_with(&self.prefix) {
            return WatchOutcome::NotSubmission;
        }
        let Some(submission_id) = extract_submission_id(url) else {
            return WatchOutcome::NoSubmissionId;
        };
        if self.last_sent == Some(submission_id) {
            return WatchOutcome::Duplicate(submission_id);
        }

        let Some(csrf) = self.jar.get(&self.csrf_cookie).await else {
            return WatchOutcome::MissingCredential(self.csrf_cookie.clone());
        };
        let Some(session) = self.jar.get(&self.session_cookie).await else {
            return WatchOutcome::MissingCredential(self.session_cookie.clone());
        };

        let message = SubmissionMessage::new(submission_id, Credentials { csrf, session });
        match self.sink.deliver(message.encode()).await {
            Ok(()) => {
                self.last_sent = Some(submission_id);
                WatchOutcome::Delivered(submission_id)
            }
            Err(e) => {
                warn!(%submission_id, code = e.error_code(), error = %e, "watcher: delivery failed, will retry on refire");
                WatchOutcome::DeliveryFailed(submission_id)
            }
        }
    }

    /// Drains intercepted URLs until the channel closes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<String>) {
        while let Some(url) = rx.recv().await {
            match self.handle_request(&url).await {
                WatchOutcome::Delivered(id) => {
                    info!(submission_id = id, "watcher: submission relayed");
                }
                WatchOutcome::Duplicate(id) => {
                    debug!(submission_id = id, "watcher: duplicate suppressed");
                }
                WatchOutcome::NoSubmissionId => {
                    debug!(%url, "watcher: no submission id in url");
                }
                WatchOutcome::MissingCredential(name) => {
                    warn!(cookie = %name, "watcher: session cookie missing, event discarded");
                }
                WatchOutcome::NotSubmission | WatchOutcome::DeliveryFailed(_) => {}
            }
        }
        info!("watcher: url channel closed, shutting down");
    }
}

#[cfg(test)]
#[path = "watch_test.rs"]
mod tests;
