//! Calls the dispatcher makes back into the VR runtime host.

use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Host-facing side effects. Implementations must not block for long: the
/// dispatcher calls them inline while the host waits on the event.
pub trait HostActions {
    fn set_tracking(&self, enabled: bool);
    fn set_modal_overlay(&self, enabled: bool);
    fn set_depth_buffer_request(&self, enabled: bool);
    fn set_window_focus(&self, pid: u32);
    fn set_input_focus(&self, pid: u32, controller_index: u32);
    fn activate_headset(&self, serial: &str, mode: u32);
}

impl<T: HostActions + ?Sized> HostActions for Arc<T> {
    fn set_tracking(&self, enabled: bool) {
        (**self).set_tracking(enabled)
    }
    fn set_modal_overlay(&self, enabled: bool) {
        (**self).set_modal_overlay(enabled)
    }
    fn set_depth_buffer_request(&self, enabled: bool) {
        (**self).set_depth_buffer_request(enabled)
    }
    fn set_window_focus(&self, pid: u32) {
        (**self).set_window_focus(pid)
    }
    fn set_input_focus(&self, pid: u32, controller_index: u32) {
        (**self).set_input_focus(pid, controller_index)
    }
    fn activate_headset(&self, serial: &str, mode: u32) {
        (**self).activate_headset(serial, mode)
    }
}

/// One host call, as a value. Used for the line protocol and for recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum HostAction {
    SetTracking { enabled: bool },
    SetModalOverlay { enabled: bool },
    SetDepthBufferRequest { enabled: bool },
    SetWindowFocus { pid: u32 },
    SetInputFocus { pid: u32, controller_index: u32 },
    ActivateHeadset { serial: String, mode: u32 },
}

/// Writes each host action as a single JSON line to `W`.
pub struct JsonLineHost<W: Write> {
    out: Mutex<W>,
}

impl<W: Write> JsonLineHost<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    /// Serializes `record` and writes it followed by a newline. Write errors
    /// are logged and dropped; the host keeps running without its echo.
    pub fn emit<T: Serialize>(&self, record: &T) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize host record");
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            warn!(error = %e, "failed to write host record");
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write> HostActions for JsonLineHost<W> {
    fn set_tracking(&self, enabled: bool) {
        self.emit(&HostAction::SetTracking { enabled });
    }
    fn set_modal_overlay(&self, enabled: bool) {
        self.emit(&HostAction::SetModalOverlay { enabled });
    }
    fn set_depth_buffer_request(&self, enabled: bool) {
        self.emit(&HostAction::SetDepthBufferRequest { enabled });
    }
    fn set_window_focus(&self, pid: u32) {
        self.emit(&HostAction::SetWindowFocus { pid });
    }
    fn set_input_focus(&self, pid: u32, controller_index: u32) {
        self.emit(&HostAction::SetInputFocus { pid, controller_index });
    }
    fn activate_headset(&self, serial: &str, mode: u32) {
        self.emit(&HostAction::ActivateHeadset {
            serial: serial.to_string(),
            mode,
        });
    }
}
