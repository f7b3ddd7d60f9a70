//! Runtime configuration — env-driven site endpoints and poll cadence.
//!
//! DESIGN
//! ======
//! Every knob has a compiled default aimed at leetcode.com; env vars override
//! individual values. Malformed numeric values are logged and replaced by the
//! default rather than failing startup, so a typo'd `POLL_INTERVAL_SECS`
//! degrades gracefully instead of taking the daemon down.

use std::time::Duration;

use tracing::warn;

// =============================================================================
// DEFAULTS
// =============================================================================

pub const DEFAULT_BASE_URL: &str = "https://leetcode.com";
pub const DEFAULT_CSRF_COOKIE: &str = "csrftoken";
pub const DEFAULT_SESSION_COOKIE: &str = "LEETCODE_SESSION";
pub const DEFAULT_COOKIE_FILE: &str = "cookies.json";
pub const DEFAULT_SETTINGS_FILE: &str = "gradewatch-settings.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 6;
pub const DEFAULT_SETTINGS_REFRESH_SECS: u64 = 2;

// =============================================================================
// TYPES
// =============================================================================

/// Site endpoints and the cookie names that carry session credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    /// Origin without trailing slash, e.g. `https://leetcode.com`.
    pub base_url: String,
    pub csrf_cookie: String,
    pub session_cookie: String,
    /// JSON file holding current cookie values, re-read per lookup.
    pub cookie_file: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

/// Cadence and attempt budget for one grading poll session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay before the first probe and between probes.
    pub interval: Duration,
    /// Inconclusive probes tolerated before the session gives up.
    pub max_attempts: u32,
}

// =============================================================================
// CONSTRUCTION
// =============================================================================

impl SiteConfig {
    /// Builds from env vars, falling back to leetcode.com defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            base_url: env_string("SITE_BASE_URL", DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_owned(),
            csrf_cookie: env_string("SITE_CSRF_COOKIE", DEFAULT_CSRF_COOKIE),
            session_cookie: env_string("SITE_SESSION_COOKIE", DEFAULT_SESSION_COOKIE),
            cookie_file: env_string("SITE_COOKIE_FILE", DEFAULT_COOKIE_FILE),
            request_timeout: Duration::from_secs(env_parse_u64(
                "SITE_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            connect_timeout: Duration::from_secs(env_parse_u64(
                "SITE_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )),
        }
    }

    /// GraphQL endpoint, trailing slash included (the site 301s without it).
    #[must_use]
    pub fn graphql_url(&self) -> String {
        format!("{}/graphql/", self.base_url)
    }

    /// Prefix that marks a request as submission traffic.
    #[must_use]
    pub fn submissions_prefix(&self) -> String {
        format!("{}/submissions/", self.base_url)
    }
}

impl PollConfig {
    /// Builds from env vars. Zero values are rejected: a zero attempt budget
    /// would terminate the session before it observes anything, and a zero
    /// interval is not a valid ticker period.
    #[must_use]
    pub fn from_env() -> Self {
        let mut max_attempts = env_parse_u32("POLL_MAX_ATTEMPTS", DEFAULT_POLL_MAX_ATTEMPTS);
        if max_attempts == 0 {
            warn!("POLL_MAX_ATTEMPTS=0 ignored, using default");
            max_attempts = DEFAULT_POLL_MAX_ATTEMPTS;
        }
        let mut interval_secs = env_parse_u64("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS);
        if interval_secs == 0 {
            warn!("POLL_INTERVAL_SECS=0 ignored, using default");
            interval_secs = DEFAULT_POLL_INTERVAL_SECS;
        }
        Self {
            interval: Duration::from_secs(interval_secs),
            max_attempts,
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

/// Path of the settings-store file.
#[must_use]
pub fn settings_file() -> String {
    env_string("SETTINGS_FILE", DEFAULT_SETTINGS_FILE)
}

/// How often the settings file is re-read for edits made by other processes.
/// Zero is rejected like a zero poll interval.
#[must_use]
pub fn settings_refresh_period() -> Duration {
    let mut secs = env_parse_u64("SETTINGS_REFRESH_SECS", DEFAULT_SETTINGS_REFRESH_SECS);
    if secs == 0 {
        warn!("SETTINGS_REFRESH_SECS=0 ignored, using default");
        secs = DEFAULT_SETTINGS_REFRESH_SECS;
    }
    Duration::from_secs(secs)
}

// =============================================================================
// ENV HELPERS
// =============================================================================

fn env_string(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_owned())
}

fn env_parse_u64(var: &str, default: u64) -> u64 {
    match std::env::var(var) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(%var, %raw, "invalid numeric env value, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_parse_u32(var: &str, default: u32) -> u32 {
    match std::env::var(var) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(%var, %raw, "invalid numeric env value, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
