mod bridge;
mod capability;
mod config;
mod dispatcher;
mod event;
mod host;
mod launcher;
mod paths;
mod priority;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::bridge::DriverEvent;
use crate::config::{ConfigSnapshot, ConfigSource, JsonFileSource, LoadStatus};
use crate::dispatcher::LifecycleDispatcher;
use crate::host::JsonLineHost;
use crate::launcher::SystemLauncher;
use crate::priority::SystemPriority;

/// Capability gatekeeper and lifecycle policy for the VR runtime host.
#[derive(Debug, Parser)]
#[command(name = "appfw-daemon", version)]
struct Args {
    /// Settings file. Defaults to %LOCALAPPDATA%\ReLinked VR\RLVRSettings.json.
    #[arg(long, env = "RLVR_SETTINGS")]
    config: Option<PathBuf>,
}

/// Loads the snapshot from `path`. An unresolvable settings location is
/// treated like a missing file.
fn load_settings(
    source: &dyn ConfigSource,
    path: Result<PathBuf>,
) -> (ConfigSnapshot, LoadStatus) {
    match path {
        Ok(path) => {
            let (snapshot, status) = ConfigSnapshot::load(source, &path);
            info!(path = %path.display(), ?status, "settings");
            (snapshot, status)
        }
        Err(e) => {
            let error = format!("{e:#}");
            warn!(%error, "settings location unavailable, using defaults");
            (ConfigSnapshot::default(), LoadStatus::Absent)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries host actions, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = args.config.map(Ok).unwrap_or_else(paths::settings_file_path);
    let (snapshot, _) = load_settings(&JsonFileSource, config_path);

    // ── Dispatcher ────────────────────────────────────────────────────────────
    let host = Arc::new(JsonLineHost::new(std::io::stdout()));
    let dispatcher = LifecycleDispatcher::new(
        snapshot,
        Arc::clone(&host),
        SystemLauncher::new(),
        &SystemPriority,
    );
    debug!(gatekeepers = ?dispatcher.registry().entries(), "enabled gatekeepers");

    let (event_tx, mut event_rx) = mpsc::channel::<DriverEvent>(32);

    // ── Background tasks ──────────────────────────────────────────────────────
    // The reader thread is never joined; it may stay blocked on stdin at exit.
    bridge::spawn_reader(BufReader::new(std::io::stdin()), event_tx.clone())
        .context("Failed to spawn request reader")?;

    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(DriverEvent::Interrupted).await;
            }
        });
    }
    drop(event_tx);

    info!(version = env!("CARGO_PKG_VERSION"), "appfw-daemon started");

    // ── Event loop ────────────────────────────────────────────────────────────
    // Single consumer: requests reach the dispatcher strictly one at a time.
    while let Some(evt) = event_rx.recv().await {
        match evt {
            DriverEvent::Request(request) => {
                if let Some(reply) = bridge::serve(&dispatcher, request) {
                    if let bridge::BridgeResponse::Error { message } = &reply {
                        error!(%message, "request failed");
                    }
                    host.emit(&reply);
                }
                if dispatcher.is_shut_down() {
                    break;
                }
            }
            DriverEvent::InputClosed => {
                info!("request stream closed");
                break;
            }
            DriverEvent::Interrupted => {
                info!("interrupted");
                break;
            }
        }
    }

    dispatcher.shutdown();
    Ok(())
}
