//! Settings store — persisted user preferences with change fan-out.
//!
//! ARCHITECTURE
//! ============
//! A flat key-value store behind a pluggable backend. Reads are served from
//! memory; writes update memory first and then persist the one changed key,
//! so readers never observe a stale value while a write is in flight.
//! External writers (another process editing the same backing file) are
//! folded in through `apply_external`, which fans out to registered
//! observers.
//!
//! DESIGN
//! ======
//! - Storage keys are wire-frozen (`problemPanelWidth`, `panelEnabled`,
//!   `darkMode`, `appEnabled`); missing or wrong-typed stored values fall
//!   back to per-key defaults and are never an error.
//! - The store accepts any width. Range policy lives with UI write sites,
//!   which all clamp through [`clamp_panel_width`].
//! - Observers are zero-argument callbacks invoked synchronously, in
//!   registration order, once per external batch. There is no removal API.
//! - External edits are detected by diffing backend values against the last
//!   raw observation, never against typed memory: a value that cannot be
//!   folded is reported once, and a local write still in flight is not
//!   mistaken for an edit.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::message::ErrorCode;

// =============================================================================
// STORAGE KEYS
// =============================================================================

pub const KEY_PANEL_WIDTH: &str = "problemPanelWidth";
pub const KEY_PANEL_ENABLED: &str = "panelEnabled";
pub const KEY_DARK_MODE: &str = "darkMode";
pub const KEY_APP_ENABLED: &str = "appEnabled";

// =============================================================================
// WIDTH POLICY
// =============================================================================

pub const DEFAULT_PANEL_WIDTH: u32 = 525;
pub const MIN_PANEL_WIDTH: u32 = 350;
pub const MAX_PANEL_WIDTH: u32 = 800;

/// Range policy for the panel width. The store itself accepts any value;
/// every UI write site clamps through here.
#[must_use]
pub fn clamp_panel_width(width: u32) -> u32 {
    width.clamp(MIN_PANEL_WIDTH, MAX_PANEL_WIDTH)
}

// =============================================================================
// TYPES
// =============================================================================

/// Point-in-time view of every setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub problem_panel_width: u32,
    pub panel_enabled: bool,
    pub dark_mode: bool,
    pub app_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            problem_panel_width: DEFAULT_PANEL_WIDTH,
            panel_enabled: false,
            dark_mode: false,
            app_enabled: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings backend io: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings backend encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl ErrorCode for SettingsError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "E_SETTINGS_IO",
            Self::Encoding(_) => "E_SETTINGS_ENCODING",
        }
    }
}

// =============================================================================
// BACKEND
// =============================================================================

/// Seam over the underlying key-value store. Mocked in tests; backed by a
/// JSON file in production.
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    /// Reads one key; `None` when the key was never written.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] when the store is unreadable or corrupt.
    async fn read(&self, key: &str) -> Result<Option<Value>, SettingsError>;

    /// Writes one key.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] when the store cannot be updated.
    async fn write(&self, key: &str, value: Value) -> Result<(), SettingsError>;
}

/// In-memory backend for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryBackend {
    values: tokio::sync::Mutex<HashMap<String, Value>>,
}

#[async_trait]
impl SettingsBackend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        self.values.lock().await.insert(key.to_owned(), value);
        Ok(())
    }
}

/// Single-file JSON backend. The whole store is one flat object; each write
/// is a read-modify-write of that object.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_map(&self) -> Result<serde_json::Map<String, Value>, SettingsError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(serde_json::Map::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&raw)? {
            Value::Object(map) => Ok(map),
            other => {
                warn!(path = %self.path.display(), found = %value_kind(&other), "settings file is not a JSON object, treating as empty");
                Ok(serde_json::Map::new())
            }
        }
    }
}

#[async_trait]
impl SettingsBackend for JsonFileBackend {
    async fn read(&self, key: &str) -> Result<Option<Value>, SettingsError> {
        Ok(self.read_map().await?.get(key).cloned())
    }

    async fn write(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        let mut map = self.read_map().await?;
        map.insert(key.to_owned(), value);
        let rendered = serde_json::to_string_pretty(&Value::Object(map))?;
        tokio::fs::write(&self.path, rendered).await?;
        Ok(())
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// STORE
// =============================================================================

type Observer = Box<dyn Fn() + Send + Sync>;

struct Inner {
    values: RwLock<Settings>,
    /// Raw backend value per key as of the last observation (load, a landed
    /// setter write, or a refresh pass). Refresh diffs run against this.
    seen: Mutex<HashMap<&'static str, Value>>,
    observers: Mutex<Vec<Observer>>,
    backend: Arc<dyn SettingsBackend>,
}

/// Cheap-to-clone handle; all clones share values, observers, and backend.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<Inner>,
}

impl SettingsStore {
    /// Hydrates from the backend, one key at a time. A missing or
    /// wrong-typed key falls back to its default.
    ///
    /// # Errors
    /// Backend read failures (unreadable or corrupt store).
    pub async fn load(backend: Arc<dyn SettingsBackend>) -> Result<Self, SettingsError> {
        let mut settings = Settings::default();
        let mut seen = HashMap::new();

        if let Some(raw) = backend.read(KEY_PANEL_WIDTH).await? {
            match as_width(&raw) {
                Some(width) => settings.problem_panel_width = width,
                None => warn!(key = KEY_PANEL_WIDTH, "ignoring wrong-typed stored value"),
            }
            seen.insert(KEY_PANEL_WIDTH, raw);
        }
        if let Some(raw) = backend.read(KEY_PANEL_ENABLED).await? {
            match raw.as_bool() {
                Some(enabled) => settings.panel_enabled = enabled,
                None => warn!(key = KEY_PANEL_ENABLED, "ignoring wrong-typed stored value"),
            }
            seen.insert(KEY_PANEL_ENABLED, raw);
        }
        if let Some(raw) = backend.read(KEY_DARK_MODE).await? {
            match raw.as_bool() {
                Some(dark) => settings.dark_mode = dark,
                None => warn!(key = KEY_DARK_MODE, "ignoring wrong-typed stored value"),
            }
            seen.insert(KEY_DARK_MODE, raw);
        }
        if let Some(raw) = backend.read(KEY_APP_ENABLED).await? {
            match raw.as_bool() {
                Some(enabled) => settings.app_enabled = enabled,
                None => warn!(key = KEY_APP_ENABLED, "ignoring wrong-typed stored value"),
            }
            seen.insert(KEY_APP_ENABLED, raw);
        }

        Ok(Self {
            inner: Arc::new(Inner {
                values: RwLock::new(settings),
                seen: Mutex::new(seen),
                observers: Mutex::new(Vec::new()),
                backend,
            }),
        })
    }

    // -- reads ---------------------------------------------------------------

    #[must_use]
    pub fn problem_panel_width(&self) -> u32 {
        self.values().problem_panel_width
    }

    #[must_use]
    pub fn panel_enabled(&self) -> bool {
        self.values().panel_enabled
    }

    #[must_use]
    pub fn dark_mode(&self) -> bool {
        self.values().dark_mode
    }

    #[must_use]
    pub fn app_enabled(&self) -> bool {
        self.values().app_enabled
    }

    #[must_use]
    pub fn snapshot(&self) -> Settings {
        *self.values()
    }

    // -- writes --------------------------------------------------------------

    /// # Errors
    /// Backend write failures. Memory is already updated when this returns
    /// an error; memory is the read path, the backend is durability.
    pub async fn set_problem_panel_width(&self, width: u32) -> Result<(), SettingsError> {
        self.values_mut().problem_panel_width = width;
        self.persist(KEY_PANEL_WIDTH, Value::from(width)).await
    }

    /// # Errors
    /// Backend write failures.
    pub async fn set_panel_enabled(&self, enabled: bool) -> Result<(), SettingsError> {
        self.values_mut().panel_enabled = enabled;
        self.persist(KEY_PANEL_ENABLED, Value::from(enabled)).await
    }

    /// # Errors
    /// Backend write failures.
    pub async fn set_dark_mode(&self, dark: bool) -> Result<(), SettingsError> {
        self.values_mut().dark_mode = dark;
        self.persist(KEY_DARK_MODE, Value::from(dark)).await
    }

    /// # Errors
    /// Backend write failures.
    pub async fn set_app_enabled(&self, enabled: bool) -> Result<(), SettingsError> {
        self.values_mut().app_enabled = enabled;
        self.persist(KEY_APP_ENABLED, Value::from(enabled)).await
    }

    /// Backend write plus last-seen bookkeeping: a landed write must not
    /// read back as an external edit on the next refresh pass.
    async fn persist(&self, key: &'static str, value: Value) -> Result<(), SettingsError> {
        self.inner.backend.write(key, value.clone()).await?;
        self.seen().insert(key, value);
        Ok(())
    }

    // -- change fan-out ------------------------------------------------------

    /// Registers a change observer. Observers must not register further
    /// observers from inside the callback.
    pub fn add_observer(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.observers().push(Box::new(observer));
    }

    /// Folds externally written key/value pairs into memory, then invokes
    /// every observer in registration order. Unknown keys and wrong-typed
    /// values are skipped. Observers fire once per batch, not once per key.
    pub fn apply_external(&self, changes: &HashMap<String, Value>) {
        {
            let mut values = self.values_mut();
            for (key, value) in changes {
                match key.as_str() {
                    KEY_PANEL_WIDTH => match as_width(value) {
                        Some(width) => values.problem_panel_width = width,
                        None => warn!(%key, "ignoring wrong-typed external value"),
                    },
                    KEY_PANEL_ENABLED => match value.as_bool() {
                        Some(enabled) => values.panel_enabled = enabled,
                        None => warn!(%key, "ignoring wrong-typed external value"),
                    },
                    KEY_DARK_MODE => match value.as_bool() {
                        Some(dark) => values.dark_mode = dark,
                        None => warn!(%key, "ignoring wrong-typed external value"),
                    },
                    KEY_APP_ENABLED => match value.as_bool() {
                        Some(enabled) => values.app_enabled = enabled,
                        None => warn!(%key, "ignoring wrong-typed external value"),
                    },
                    _ => debug!(%key, "ignoring unknown settings key"),
                }
            }
        }

        for observer in self.observers().iter() {
            observer();
        }
    }

    /// Backend values that changed since the last observation. Each pass
    /// commits what it saw, so an edit that cannot be folded is reported
    /// once, not on every pass, and a key still holding our own last write
    /// is never reported at all.
    async fn external_changes(&self) -> Result<HashMap<String, Value>, SettingsError> {
        const KEYS: [&str; 4] = [KEY_PANEL_WIDTH, KEY_PANEL_ENABLED, KEY_DARK_MODE, KEY_APP_ENABLED];

        let mut observed = Vec::with_capacity(KEYS.len());
        for key in KEYS {
            if let Some(value) = self.inner.backend.read(key).await? {
                observed.push((key, value));
            }
        }

        let mut seen = self.seen();
        let mut changes = HashMap::new();
        for (key, value) in observed {
            if seen.get(key) != Some(&value) {
                seen.insert(key, value.clone());
                changes.insert(key.to_owned(), value);
            }
        }
        Ok(changes)
    }

    // -- lock plumbing -------------------------------------------------------

    fn values(&self) -> RwLockReadGuard<'_, Settings> {
        self.inner.values.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn values_mut(&self) -> RwLockWriteGuard<'_, Settings> {
        self.inner.values.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn observers(&self) -> MutexGuard<'_, Vec<Observer>> {
        self.inner.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn seen(&self) -> MutexGuard<'_, HashMap<&'static str, Value>> {
        self.inner.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn as_width(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

// =============================================================================
// EXTERNAL CHANGE REFRESH
// =============================================================================

/// Spawns a task that periodically re-reads the store's backend and folds
/// external edits into memory. Returns a handle for shutdown.
///
/// Keys deleted from the backend are left at their last in-memory value;
/// only present-and-changed values count as edits.
#[must_use]
pub fn spawn_refresh_task(store: SettingsStore, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match store.external_changes().await {
                Ok(changes) if !changes.is_empty() => store.apply_external(&changes),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "settings refresh failed"),
            }
        }
    })
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
