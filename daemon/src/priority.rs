//! Scheduling priority for the hosting process.
//!
//! When `autoHighPriority` is set the daemon asks the OS, once at startup, to
//! move its own process into the high priority class so compositor callbacks
//! are not starved by the game.
//!
//! On non-Windows platforms the request compiles and reports `false`.

// ── Windows implementation ─────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use anyhow::{Context, Result};
    use windows::Win32::System::Threading::{
        GetCurrentProcess, SetPriorityClass, HIGH_PRIORITY_CLASS,
    };

    /// Sets `HIGH_PRIORITY_CLASS` on the current process.
    pub fn raise_current_process() -> Result<()> {
        // The pseudo-handle from GetCurrentProcess needs no CloseHandle.
        unsafe { SetPriorityClass(GetCurrentProcess(), HIGH_PRIORITY_CLASS) }
            .context("SetPriorityClass failed")
    }
}

// ── Public API ─────────────────────────────────────────────────────────────────

pub trait OsPriority {
    /// Returns `true` if the current process now runs at high priority.
    fn request_high_priority_for_current_process(&self) -> bool;
}

/// Uses the real OS scheduler API.
pub struct SystemPriority;

impl OsPriority for SystemPriority {
    fn request_high_priority_for_current_process(&self) -> bool {
        #[cfg(windows)]
        {
            match imp::raise_current_process() {
                Ok(()) => true,
                Err(e) => {
                    let error = format!("{e:#}");
                    tracing::warn!(%error, "priority elevation failed");
                    false
                }
            }
        }
        #[cfg(not(windows))]
        {
            tracing::debug!("priority elevation is only supported on Windows");
            false
        }
    }
}
