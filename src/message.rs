//! Submission message — the typed envelope crossing the watcher/relay boundary.
//!
//! ARCHITECTURE
//! ============
//! The watcher and the relay never share in-memory types: everything crossing
//! the boundary is serialized JSON, so either side can be swapped for an
//! out-of-process peer without touching the codec. The type tag is validated
//! before the payload is deserialized; anything else on the channel is
//! rejected up front and never reaches relay logic.
//!
//! DESIGN
//! ======
//! - Field names are wire-frozen (`msgType`, `submissionID`, `csrftoken`,
//!   `session`) to stay compatible with existing interceptor shims.
//! - `submissionID` must be a JSON integer; a missing, null, or non-numeric
//!   value is a decode error, never a silent zero.
//! - Credentials redact themselves in `Debug`, so they cannot leak through
//!   structured logs.

use serde::{Deserialize, Serialize};

// =============================================================================
// WIRE CONSTANTS
// =============================================================================

/// Wire key carrying the message type tag.
pub const MSG_TYPE_KEY: &str = "msgType";

/// Type tag for a new-submission message.
pub const MSG_TYPE_SUBMISSION: &str = "BackgroundSubmissionMsg";

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code and retryable flag for structured logs.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// TYPES
// =============================================================================

/// Session credentials needed to query the grading API.
///
/// Both values are opaque secrets read from the browser session. They are
/// held only in memory and never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub csrf: String,
    pub session: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("csrf", &"<redacted>")
            .field("session", &"<redacted>")
            .finish()
    }
}

/// One newly observed submission, with everything the poller needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionMessage {
    pub submission_id: u64,
    pub credentials: Credentials,
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("unknown message type: {got}")]
    UnknownType { got: String },
    #[error("malformed submission message: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl ErrorCode for MessageError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownType { .. } => "E_MSG_UNKNOWN_TYPE",
            Self::Malformed(_) => "E_MSG_MALFORMED",
        }
    }
}

/// Serialized form. Kept private: callers see only the logical type.
#[derive(Serialize, Deserialize)]
struct WireSubmission {
    #[serde(rename = "msgType")]
    msg_type: String,
    #[serde(rename = "submissionID")]
    submission_id: u64,
    csrftoken: String,
    session: String,
}

// =============================================================================
// CODEC
// =============================================================================

impl SubmissionMessage {
    #[must_use]
    pub fn new(submission_id: u64, credentials: Credentials) -> Self {
        Self { submission_id, credentials }
    }

    /// Serialize to the wire shape. Always stamps the type tag.
    #[must_use]
    pub fn encode(&self) -> serde_json::Value {
        serde_json::json!({
            MSG_TYPE_KEY: MSG_TYPE_SUBMISSION,
            "submissionID": self.submission_id,
            "csrftoken": self.credentials.csrf,
            "session": self.credentials.session,
        })
    }

    /// Decode from the wire shape, validating the tag before the payload.
    ///
    /// # Errors
    /// `UnknownType` when the tag is absent or not ours; `Malformed` when a
    /// payload field is missing or mistyped.
    pub fn decode(raw: &serde_json::Value) -> Result<Self, MessageError> {
        let tag = raw.get(MSG_TYPE_KEY).and_then(serde_json::Value::as_str);
        if tag != Some(MSG_TYPE_SUBMISSION) {
            return Err(MessageError::UnknownType { got: tag.unwrap_or("<missing>").to_owned() });
        }

        let wire: WireSubmission = serde_json::from_value(raw.clone())?;
        Ok(Self {
            submission_id: wire.submission_id,
            credentials: Credentials { csrf: wire.csrftoken, session: wire.session },
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
