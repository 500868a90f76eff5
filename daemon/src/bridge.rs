//! Line-oriented development bridge: one JSON request per stdin line, JSON
//! responses and host actions on stdout.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dispatcher::{FpsSetting, LifecycleDispatcher};
use crate::event::LifecycleEvent;
use crate::host::HostActions;
use crate::launcher::ProcessLauncher;

/// A single call from the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum HostRequest {
    Event { event: LifecycleEvent },
    FetchGatekeeper { name: String },
    FpsSetting { serial: String },
    ConnectRemoteHeadsetClient,
    Shutdown,
}

/// Reply to a request that returns a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum BridgeResponse {
    Gatekeeper { name: String, status: u8 },
    FpsSetting { serial: String, setting: FpsSetting },
    RemoteHeadsetClient { status: u8 },
    Error { message: String },
}

/// Everything the driver loop reacts to.
#[derive(Debug)]
pub enum DriverEvent {
    Request(HostRequest),
    /// stdin reached end of file.
    InputClosed,
    /// Ctrl+C received.
    Interrupted,
}

pub fn parse_request(line: &str) -> Result<HostRequest> {
    serde_json::from_str(line).with_context(|| format!("Invalid request line: {line}"))
}

/// Runs `request` against the dispatcher. Returns the reply to emit, if any.
pub fn serve<H: HostActions, L: ProcessLauncher>(
    dispatcher: &LifecycleDispatcher<H, L>,
    request: HostRequest,
) -> Option<BridgeResponse> {
    match request {
        HostRequest::Event { event } => match dispatcher.handle(&event) {
            Ok(()) => None,
            Err(e) => Some(BridgeResponse::Error {
                message: e.to_string(),
            }),
        },
        HostRequest::FetchGatekeeper { name } => {
            let status = dispatcher.query_capability(&name).code();
            Some(BridgeResponse::Gatekeeper { name, status })
        }
        HostRequest::FpsSetting { serial } => {
            let setting = dispatcher.fps_setting_for_headset(&serial);
            Some(BridgeResponse::FpsSetting { serial, setting })
        }
        HostRequest::ConnectRemoteHeadsetClient => Some(BridgeResponse::RemoteHeadsetClient {
            status: dispatcher.connect_remote_headset_client().code(),
        }),
        HostRequest::Shutdown => {
            dispatcher.shutdown();
            None
        }
    }
}

/// Reads requests from `input` on a dedicated OS thread until EOF or until the
/// receiver is dropped. Blank and unparseable lines are skipped.
pub fn spawn_reader<R>(input: R, tx: mpsc::Sender<DriverEvent>) -> std::io::Result<std::thread::JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    std::thread::Builder::new()
        .name("request-reader".into())
        .spawn(move || read_requests(input, &tx))
}

fn read_requests<R: BufRead>(mut input: R, tx: &mpsc::Sender<DriverEvent>) {
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match input.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "failed to read request line");
                break;
            }
        }
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!(error = %e, "skipping request that is not UTF-8");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        match parse_request(line) {
            Ok(request) => {
                debug!(?request, "request received");
                if tx.blocking_send(DriverEvent::Request(request)).is_err() {
                    return;
                }
            }
            Err(e) => {
                let error = format!("{e:#}");
                warn!(%error, "skipping request");
            }
        }
    }
    let _ = tx.blocking_send(DriverEvent::InputClosed);
}
