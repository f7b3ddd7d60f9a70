use std::path::PathBuf;

use super::*;

async fn seeded_backend(entries: &[(&str, Value)]) -> Arc<MemoryBackend> {
    let backend = Arc::new(MemoryBackend::default());
    for (key, value) in entries {
        backend.write(key, value.clone()).await.expect("seed write");
    }
    backend
}

fn temp_settings_path(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("gradewatch-{tag}-{}.json", std::process::id()))
}

#[test]
fn clamp_policy_boundaries() {
    assert_eq!(clamp_panel_width(349), MIN_PANEL_WIDTH);
    assert_eq!(clamp_panel_width(MIN_PANEL_WIDTH), MIN_PANEL_WIDTH);
    assert_eq!(clamp_panel_width(525), 525);
    assert_eq!(clamp_panel_width(MAX_PANEL_WIDTH), MAX_PANEL_WIDTH);
    assert_eq!(clamp_panel_width(801), MAX_PANEL_WIDTH);
}

#[tokio::test]
async fn defaults_when_backend_empty() {
    let store = test_helpers::memory_store().await;

    assert_eq!(store.problem_panel_width(), DEFAULT_PANEL_WIDTH);
    assert!(!store.panel_enabled());
    assert!(!store.dark_mode());
    assert!(store.app_enabled());
}

#[tokio::test]
async fn per_key_defaults_with_partial_backend() {
    let backend = seeded_backend(&[(KEY_DARK_MODE, Value::from(true))]).await;
    let store = SettingsStore::load(backend).await.expect("load");

    assert!(store.dark_mode());
    assert_eq!(store.problem_panel_width(), DEFAULT_PANEL_WIDTH);
    assert!(!store.panel_enabled());
    assert!(store.app_enabled());
}

#[tokio::test]
async fn wrong_typed_stored_values_fall_back() {
    let backend = seeded_backend(&[
        (KEY_PANEL_WIDTH, Value::from("wide")),
        (KEY_APP_ENABLED, Value::from(7)),
        (KEY_PANEL_ENABLED, Value::from(-3)),
    ])
    .await;
    let store = SettingsStore::load(backend).await.expect("load");

    assert_eq!(store.problem_panel_width(), DEFAULT_PANEL_WIDTH);
    assert!(store.app_enabled());
    assert!(!store.panel_enabled());
}

#[tokio::test]
async fn width_round_trips_through_reload() {
    let backend = Arc::new(MemoryBackend::default());
    let store = SettingsStore::load(backend.clone()).await.expect("load");

    store.set_problem_panel_width(600).await.expect("set width");
    assert_eq!(store.problem_panel_width(), 600);

    let reloaded = SettingsStore::load(backend).await.expect("reload");
    assert_eq!(reloaded.problem_panel_width(), 600);
}

#[tokio::test]
async fn store_does_not_clamp() {
    let backend = Arc::new(MemoryBackend::default());
    let store = SettingsStore::load(backend.clone()).await.expect("load");

    store.set_problem_panel_width(900).await.expect("set width");
    assert_eq!(store.problem_panel_width(), 900);

    let reloaded = SettingsStore::load(backend).await.expect("reload");
    assert_eq!(reloaded.problem_panel_width(), 900);
}

#[tokio::test]
async fn toggles_round_trip() {
    let backend = Arc::new(MemoryBackend::default());
    let store = SettingsStore::load(backend.clone()).await.expect("load");

    store.set_panel_enabled(true).await.expect("set panel");
    store.set_dark_mode(true).await.expect("set dark");
    store.set_app_enabled(false).await.expect("set app");

    let reloaded = SettingsStore::load(backend).await.expect("reload");
    assert!(reloaded.panel_enabled());
    assert!(reloaded.dark_mode());
    assert!(!reloaded.app_enabled());
}

#[tokio::test]
async fn observers_fire_in_registration_order() {
    let store = test_helpers::memory_store().await;
    let order = Arc::new(Mutex::new(Vec::new()));

    for tag in 1..=3 {
        let order = order.clone();
        store.add_observer(move || order.lock().unwrap().push(tag));
    }

    store.apply_external(&HashMap::from([(KEY_DARK_MODE.to_owned(), Value::from(true))]));

    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test]
async fn observers_fire_once_per_batch() {
    let store = test_helpers::memory_store().await;
    let calls = Arc::new(Mutex::new(0_usize));

    let counter = calls.clone();
    store.add_observer(move || *counter.lock().unwrap() += 1);

    store.apply_external(&HashMap::from([
        (KEY_DARK_MODE.to_owned(), Value::from(true)),
        (KEY_PANEL_ENABLED.to_owned(), Value::from(true)),
        (KEY_PANEL_WIDTH.to_owned(), Value::from(400)),
    ]));

    assert_eq!(*calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn apply_external_updates_values_and_skips_junk() {
    let store = test_helpers::memory_store().await;

    store.apply_external(&HashMap::from([
        (KEY_PANEL_WIDTH.to_owned(), Value::from(640)),
        (KEY_PANEL_ENABLED.to_owned(), Value::from("yes")),
        ("someFutureKey".to_owned(), Value::from(1)),
    ]));

    assert_eq!(store.problem_panel_width(), 640);
    assert!(!store.panel_enabled());
}

#[tokio::test]
async fn setter_failure_keeps_memory_value() {
    struct FailingBackend(MemoryBackend);

    #[async_trait]
    impl SettingsBackend for FailingBackend {
        async fn read(&self, key: &str) -> Result<Option<Value>, SettingsError> {
            self.0.read(key).await
        }

        async fn write(&self, _key: &str, _value: Value) -> Result<(), SettingsError> {
            Err(SettingsError::Io(std::io::Error::other("disk full")))
        }
    }

    let seeded = MemoryBackend::default();
    seeded.write(KEY_PANEL_WIDTH, Value::from(500)).await.expect("seed");
    let store = SettingsStore::load(Arc::new(FailingBackend(seeded))).await.expect("load");

    let result = store.set_problem_panel_width(610).await;
    assert!(matches!(result, Err(SettingsError::Io(_))));
    assert_eq!(store.problem_panel_width(), 610);

    // The backend still serves 500, but that matches the last observation,
    // so a refresh pass does not revert the unpersisted write.
    assert!(store.external_changes().await.expect("diff").is_empty());
    assert_eq!(store.problem_panel_width(), 610);
}

#[tokio::test]
async fn json_file_backend_round_trip() {
    let path = temp_settings_path("roundtrip");
    let _ = tokio::fs::remove_file(&path).await;

    let backend = Arc::new(JsonFileBackend::new(&path));
    assert!(backend.read(KEY_PANEL_WIDTH).await.expect("read missing file").is_none());

    let store = SettingsStore::load(backend.clone()).await.expect("load");
    store.set_problem_panel_width(600).await.expect("set width");
    store.set_dark_mode(true).await.expect("set dark");

    let reloaded = SettingsStore::load(backend).await.expect("reload");
    assert_eq!(reloaded.problem_panel_width(), 600);
    assert!(reloaded.dark_mode());

    let _ = tokio::fs::remove_file(&path).await;
}

#[tokio::test]
async fn external_changes_reports_only_diffs() {
    let backend = Arc::new(MemoryBackend::default());
    let store = SettingsStore::load(backend.clone()).await.expect("load");

    store.set_panel_enabled(true).await.expect("set");
    backend.write(KEY_PANEL_WIDTH, Value::from(700)).await.expect("external write");

    let changes = store.external_changes().await.expect("diff");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes.get(KEY_PANEL_WIDTH), Some(&Value::from(700)));
}

#[tokio::test]
async fn junk_external_edit_reported_only_once() {
    let backend = Arc::new(MemoryBackend::default());
    let store = SettingsStore::load(backend.clone()).await.expect("load");

    backend.write(KEY_PANEL_ENABLED, Value::from("yes")).await.expect("external write");

    let first = store.external_changes().await.expect("diff");
    assert_eq!(first.get(KEY_PANEL_ENABLED), Some(&Value::from("yes")));
    store.apply_external(&first);

    // Observed but unfoldable; later passes must stay quiet instead of
    // rediscovering the same junk forever.
    for _ in 0..3 {
        assert!(store.external_changes().await.expect("diff").is_empty());
    }
    assert!(!store.panel_enabled());
}

#[tokio::test]
async fn junk_present_at_load_is_not_an_external_change() {
    let backend = seeded_backend(&[(KEY_PANEL_ENABLED, Value::from("yes"))]).await;
    let store = SettingsStore::load(backend).await.expect("load");

    assert!(store.external_changes().await.expect("diff").is_empty());
    assert!(!store.panel_enabled());
}

#[tokio::test]
async fn refresh_pass_ignores_in_flight_writes() {
    /// Writes park until released, so a refresh pass can run while a
    /// setter's backend write is still in flight.
    struct ParkedWrites {
        inner: MemoryBackend,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl SettingsBackend for ParkedWrites {
        async fn read(&self, key: &str) -> Result<Option<Value>, SettingsError> {
            self.inner.read(key).await
        }

        async fn write(&self, key: &str, value: Value) -> Result<(), SettingsError> {
            self.release.notified().await;
            self.inner.write(key, value).await
        }
    }

    let seeded = MemoryBackend::default();
    seeded.write(KEY_PANEL_WIDTH, Value::from(500)).await.expect("seed");
    let backend = Arc::new(ParkedWrites { inner: seeded, release: tokio::sync::Notify::new() });
    let store = SettingsStore::load(backend.clone()).await.expect("load");

    let fired = Arc::new(Mutex::new(0_usize));
    let counter = fired.clone();
    store.add_observer(move || *counter.lock().unwrap() += 1);

    let setter = {
        let store = store.clone();
        tokio::spawn(async move { store.set_problem_panel_width(610).await })
    };
    while store.problem_panel_width() != 610 {
        tokio::task::yield_now().await;
    }

    // The write has not landed; the backend still serves 500. That must not
    // read as an external edit that reverts memory.
    assert!(store.external_changes().await.expect("diff").is_empty());
    assert_eq!(store.problem_panel_width(), 610);
    assert_eq!(*fired.lock().unwrap(), 0);

    backend.release.notify_one();
    setter.await.expect("join").expect("set width");
    assert!(store.external_changes().await.expect("diff").is_empty());
}

#[tokio::test]
async fn refresh_task_folds_external_edits() {
    let backend = Arc::new(MemoryBackend::default());
    let store = SettingsStore::load(backend.clone()).await.expect("load");

    let fired = Arc::new(Mutex::new(0_usize));
    let counter = fired.clone();
    store.add_observer(move || *counter.lock().unwrap() += 1);

    let task = spawn_refresh_task(store.clone(), Duration::from_millis(10));
    backend.write(KEY_DARK_MODE, Value::from(true)).await.expect("external write");

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(store.dark_mode());
    assert_eq!(*fired.lock().unwrap(), 1);

    task.abort();
}

#[tokio::test]
async fn refresh_task_does_not_refire_ignored_values() {
    let backend = Arc::new(MemoryBackend::default());
    let store = SettingsStore::load(backend.clone()).await.expect("load");

    let fired = Arc::new(Mutex::new(0_usize));
    let counter = fired.clone();
    store.add_observer(move || *counter.lock().unwrap() += 1);

    let task = spawn_refresh_task(store.clone(), Duration::from_millis(10));
    backend.write(KEY_PANEL_ENABLED, Value::from("yes")).await.expect("external write");

    // Many periods pass; the unfoldable value is reported on one of them
    // and never again.
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(!store.panel_enabled());
    assert_eq!(*fired.lock().unwrap(), 1);

    task.abort();
}

#[tokio::test]
async fn json_file_backend_recovers_from_non_object_file() {
    let path = temp_settings_path("nonobject");
    tokio::fs::write(&path, "[1, 2, 3]").await.expect("seed file");

    let backend = Arc::new(JsonFileBackend::new(&path));
    assert!(backend.read(KEY_PANEL_WIDTH).await.expect("read").is_none());

    backend.write(KEY_PANEL_WIDTH, Value::from(500)).await.expect("write");
    assert_eq!(backend.read(KEY_PANEL_WIDTH).await.expect("reread"), Some(Value::from(500)));

    let _ = tokio::fs::remove_file(&path).await;
}
