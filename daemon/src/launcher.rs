use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;
use sysinfo::{Pid, ProcessesToUpdate, System};
use thiserror::Error;
use tracing::{debug, info};

/// Launch URI for SteamVR (Steam app id 250820).
pub const STEAMVR_LAUNCH_URI: &str = "steam://rungameid/250820";

/// Executable names that identify the SteamVR server process.
const VR_SERVER_NAMES: [&str; 2] = ["vrserver.exe", "vrserver"];

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("startup program path is empty")]
    EmptyPath,
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Identifies a started process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchHandle {
    pub pid: u32,
}

/// Starts programs on behalf of the dispatcher and recognises the VR server.
pub trait ProcessLauncher {
    fn start(&self, path: &str) -> Result<LaunchHandle, LaunchError>;
    /// Runs the default VR runtime startup routine.
    fn start_default_startup(&self) -> Result<LaunchHandle, LaunchError>;
    fn is_vr_server(&self, pid: u32) -> bool;
}

/// Spawns real OS processes and inspects the process table with `sysinfo`.
pub struct SystemLauncher {
    sys: Mutex<System>,
}

impl SystemLauncher {
    pub fn new() -> Self {
        Self {
            sys: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLauncher for SystemLauncher {
    fn start(&self, path: &str) -> Result<LaunchHandle, LaunchError> {
        if path.is_empty() {
            return Err(LaunchError::EmptyPath);
        }
        let mut cmd = Command::new(path);
        // Run from the program's own directory so relative asset paths resolve.
        if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }
        spawn(cmd, path)
    }

    fn start_default_startup(&self) -> Result<LaunchHandle, LaunchError> {
        spawn(uri_opener(STEAMVR_LAUNCH_URI), STEAMVR_LAUNCH_URI)
    }

    fn is_vr_server(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut sys = self.sys.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let found = sys.process(pid).map(|p| is_vr_server_name(p.name()));
        debug!(%pid, ?found, "vr server check");
        found.unwrap_or(false)
    }
}

fn spawn(mut cmd: Command, program: &str) -> Result<LaunchHandle, LaunchError> {
    let child = cmd.spawn().map_err(|source| LaunchError::Spawn {
        program: program.to_string(),
        source,
    })?;
    let handle = LaunchHandle { pid: child.id() };
    info!(program, pid = handle.pid, "process started");
    Ok(handle)
}

/// Builds a command that hands `uri` to the platform's URI handler.
fn uri_opener(uri: &str) -> Command {
    #[cfg(windows)]
    {
        let mut cmd = Command::new("cmd");
        // The empty argument is `start`'s window title.
        cmd.args(["/C", "start", "", uri]);
        cmd
    }
    #[cfg(not(windows))]
    {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(uri);
        cmd
    }
}

/// True when `name` is the VR server executable, ignoring ASCII case.
pub fn is_vr_server_name(name: &OsStr) -> bool {
    let name = name.to_string_lossy();
    VR_SERVER_NAMES
        .iter()
        .any(|candidate| name.eq_ignore_ascii_case(candidate))
}
