//! Daemon entry point.
//!
//! LIFECYCLE
//! =========
//! 1. Install tracing, read env config, load the settings store.
//! 2. Spawn the relay (wire messages in, poll events out), the watcher
//!    (request urls in, wire messages out), the settings refresh task, and
//!    the panel task (poll events + settings changes in, view lines out).
//! 3. Feed request urls from stdin until input ends, then drop the url
//!    sender and await the watcher, relay, and panel in turn so teardown
//!    cascades through the channels and the last view line is flushed.
//!
//! stdout carries one JSON panel view per line; logs go to stderr.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use gradewatch::config::{self, PollConfig, SiteConfig};
use gradewatch::graphql::SiteClient;
use gradewatch::panel::PanelController;
use gradewatch::services::poll::PollEvent;
use gradewatch::services::relay::SubmissionRelay;
use gradewatch::services::watch::{ChannelSink, FileCookieJar, SubmissionWatcher};
use gradewatch::settings::{JsonFileBackend, MemoryBackend, SettingsStore, spawn_refresh_task};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let site = SiteConfig::from_env();
    let poll = PollConfig::from_env();

    let store = load_settings().await;
    let refresh_task = spawn_refresh_task(store.clone(), config::settings_refresh_period());

    let probe = Arc::new(SiteClient::new(site.clone()).expect("http client init failed"));

    let (wire_tx, wire_rx) = mpsc::channel(32);
    let (url_tx, url_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = mpsc::channel(32);

    let relay = SubmissionRelay::new(probe, poll, event_tx);
    let relay_task = tokio::spawn(relay.run(wire_rx));

    let watcher = SubmissionWatcher::new(
        &site,
        Arc::new(FileCookieJar::new(site.cookie_file.clone())),
        Arc::new(ChannelSink::new(wire_tx)),
    );
    let watcher_task = tokio::spawn(watcher.run(url_rx));

    let panel_task = spawn_panel_task(store, event_rx);

    info!(base_url = %site.base_url, "gradewatch: watching stdin for request urls");

    forward_lines(BufReader::new(tokio::io::stdin()), url_tx).await;
    info!("gradewatch: input ended, draining pipeline");

    // The url sender is gone: the watcher exits and drops the wire sender,
    // the relay follows and drops its event sender, and the panel drains
    // any in-flight session outcome before exiting. The refresh ticker has
    // nothing to drain.
    let _ = watcher_task.await;
    let _ = relay_task.await;
    let _ = panel_task.await;
    refresh_task.abort();
}

/// Forwards non-empty input lines to the url channel. Returns on end of
/// input, on a read error, or when every receiver is gone; the sender drops
/// either way, which starts the pipeline teardown.
async fn forward_lines<R: AsyncBufRead + Unpin>(reader: R, urls: mpsc::Sender<String>) {
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let url = line.trim();
                if url.is_empty() {
                    continue;
                }
                if urls.send(url.to_owned()).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "gradewatch: stdin read failed, stopping input");
                break;
            }
        }
    }
}

/// Opens the settings file, falling back to an in-memory store when the file
/// is unusable (the daemon still runs, settings just do not persist).
async fn load_settings() -> SettingsStore {
    let path = config::settings_file();
    match SettingsStore::load(Arc::new(JsonFileBackend::new(&path))).await {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, %path, "settings file unusable; continuing in-memory");
            SettingsStore::load(Arc::new(MemoryBackend::default()))
                .await
                .expect("memory settings init failed")
        }
    }
}

/// Folds poll outcomes and settings changes into view snapshots on stdout.
/// Emits one line at startup so the panel has initial state.
fn spawn_panel_task(
    store: SettingsStore,
    mut event_rx: mpsc::Receiver<PollEvent>,
) -> tokio::task::JoinHandle<()> {
    let (change_tx, mut change_rx) = mpsc::channel::<()>(8);
    store.add_observer(move || {
        // try_send: a pending wakeup already covers this batch.
        let _ = change_tx.try_send(());
    });

    let mut panel = PanelController::new(store);
    tokio::spawn(async move {
        emit_view(&panel);
        loop {
            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    panel.apply_event(event);
                    emit_view(&panel);
                }
                change = change_rx.recv() => {
                    if change.is_none() {
                        break;
                    }
                    emit_view(&panel);
                }
            }
        }
    })
}

fn emit_view(panel: &PanelController) {
    match serde_json::to_string(&panel.view()) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "panel view serialize failed"),
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
