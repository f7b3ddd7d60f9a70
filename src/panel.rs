//! Panel controller — settings-driven view state and verdict rendering.
//!
//! DESIGN
//! ======
//! The panel itself is an external view; this module owns the state it
//! renders from. Width writes are clamped here because the store persists
//! whatever it is given, drag-resize nudges pass through a leading-edge
//! throttle so a burst persists at most once per window, and grading
//! outcomes fold into a [`PanelView`] snapshot the binary serializes for
//! the panel process.

use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::graphql::{SubmissionDetails, status_name};
use crate::services::poll::{PollEvent, PollOutcome};
use crate::settings::{SettingsError, SettingsStore, clamp_panel_width};

/// Resize deltas arrive per mouse movement; persist at most one per window.
pub const RESIZE_THROTTLE_WINDOW: Duration = Duration::from_millis(16);

// =============================================================================
// THROTTLE
// =============================================================================

/// Leading-edge throttle: the first call in a window passes, the rest drop.
#[derive(Debug)]
pub struct Throttle {
    window: Duration,
    last_pass: Option<Instant>,
}

impl Throttle {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_pass: None,
        }
    }

    /// True when a call may pass; records the pass.
    pub fn ready(&mut self) -> bool {
        self.ready_at(Instant::now())
    }

    /// Internal: check with explicit timestamp (for testing).
    fn ready_at(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_pass {
            if now.duration_since(last) < self.window {
                return false;
            }
        }
        self.last_pass = Some(now);
        true
    }
}

// =============================================================================
// VIEW MODEL
// =============================================================================

/// Snapshot the panel renders from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelView {
    pub visible: bool,
    pub dark_mode: bool,
    pub width: u32,
    pub status_line: Option<String>,
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct PanelController {
    store: SettingsStore,
    resize_gate: Throttle,
    last_event: Option<PollEvent>,
}

impl PanelController {
    #[must_use]
    pub fn new(store: SettingsStore) -> Self {
        Self {
            store,
            resize_gate: Throttle::new(RESIZE_THROTTLE_WINDOW),
            last_event: None,
        }
    }

    /// Sets the panel width, clamped to the allowed range, and persists it.
    ///
    /// # Errors
    /// Returns the store error when the backend write fails; the clamped
    /// value is still visible in memory.
    pub async fn set_width(&self, width: u32) -> Result<(), SettingsError> {
        self.store
            .set_problem_panel_width(clamp_panel_width(width))
            .await
    }

    /// Applies a drag delta to the current width, clamped the same way as
    /// [`PanelController::set_width`]. Returns `Ok(false)` when the call was
    /// dropped by the resize throttle and nothing was written.
    ///
    /// # Errors
    /// Returns the store error when the backend write fails.
    pub async fn nudge_width(&mut self, delta: i64) -> Result<bool, SettingsError> {
        if !self.resize_gate.ready() {
            return Ok(false);
        }
        let raw = i64::from(self.store.problem_panel_width()).saturating_add(delta).max(0);
        let width = clamp_panel_width(u32::try_from(raw).unwrap_or(u32::MAX));
        self.store.set_problem_panel_width(width).await?;
        Ok(true)
    }

    /// Folds the latest grading outcome into the view. Later events replace
    /// earlier ones; the panel shows one verdict at a time.
    pub fn apply_event(&mut self, event: PollEvent) {
        debug!(submission_id = event.submission_id, "panel: outcome received");
        self.last_event = Some(event);
    }

    /// Current render snapshot. Visibility requires both the app and panel
    /// toggles.
    #[must_use]
    pub fn view(&self) -> PanelView {
        let settings = self.store.snapshot();
        PanelView {
            visible: settings.app_enabled && settings.panel_enabled,
            dark_mode: settings.dark_mode,
            width: settings.problem_panel_width,
            status_line: self.last_event.as_ref().map(status_line),
        }
    }
}

// =============================================================================
// RENDERING
// =============================================================================

fn status_line(event: &PollEvent) -> String {
    match &event.outcome {
        PollOutcome::Resolved { details } => render_verdict(details),
        PollOutcome::Exhausted { attempts } => format!(
            "still judging after {attempts} checks; open the submission page for the verdict"
        ),
        PollOutcome::Aborted { error } => format!("result check failed: {error}"),
    }
}

fn render_verdict(details: &SubmissionDetails) -> String {
    let mut line = match details.status_code {
        Some(code) => status_name(code).map_or_else(|| format!("status {code}"), str::to_string),
        None => "status unknown".to_string(),
    };
    if let (Some(correct), Some(total)) = (details.total_correct, details.total_testcases) {
        line.push_str(&format!(" ({correct}/{total})"));
    }
    if let Some(runtime) = &details.runtime_display {
        line.push_str(&format!(" in {runtime}"));
    }
    line
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "panel_test.rs"]
mod tests;
