use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::io;
use std::path::Path;
use tracing::{debug, trace, warn};

pub const KEY_ENABLE_SOFTWARE_AUTOSTART: &str = "enableSoftwareAutoStart";
pub const KEY_ALLOW_OTHER_SOFTWARE: &str = "allowOtherSoftware";
pub const KEY_CUSTOM_STARTUP_PROGRAM_PATH: &str = "customStartupProgramPath";
pub const KEY_AUTO_HIGH_PRIORITY: &str = "autoHighPriority";
pub const KEY_USE_CUSTOM_FPS: &str = "useCustomFps";
pub const KEY_CUSTOM_FPS: &str = "customFps";
pub const KEY_ENABLED_GKS: &str = "enabledGks";

/// Supplies the raw settings document.
///
/// `Ok(None)` means no document exists at `path`. `Err` means one exists but
/// could not be read or parsed.
pub trait ConfigSource {
    fn read(&self, path: &Path) -> Result<Option<Value>>;
}

/// Reads a JSON settings file from disk.
pub struct JsonFileSource;

impl ConfigSource for JsonFileSource {
    fn read(&self, path: &Path) -> Result<Option<Value>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read settings file: {}", path.display()))
            }
        };
        let value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
        Ok(Some(value))
    }
}

/// How the snapshot came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// No settings file; every field holds its default.
    Absent,
    /// The settings document was read and its well-typed fields applied.
    Loaded,
    /// A settings file exists but is unreadable, not JSON, or not an object.
    Malformed,
}

/// Immutable policy values, read once at startup from `RLVRSettings.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    /// Launch the startup program when a headset display attaches.
    pub enable_software_autostart: bool,
    /// Grant focus to any new process, not only the VR server, and honour
    /// `custom_startup_program_path`.
    pub allow_other_software: bool,
    /// Program launched instead of the default startup routine. Empty = unset.
    pub custom_startup_program_path: String,
    /// Raise the hosting process to the high priority class at startup.
    pub auto_high_priority: bool,
    pub use_custom_fps: bool,
    pub custom_fps: i32,
    /// Gatekeeper names appended after the built-in set, in file order.
    pub extra_capabilities: Vec<String>,
}

impl ConfigSnapshot {
    /// Loads the snapshot from `source`. Never fails: anything other than a
    /// readable JSON object yields `ConfigSnapshot::default()`.
    pub fn load(source: &dyn ConfigSource, path: &Path) -> (Self, LoadStatus) {
        match source.read(path) {
            Ok(None) => {
                debug!(path = %path.display(), "no settings file, using defaults");
                (Self::default(), LoadStatus::Absent)
            }
            Ok(Some(Value::Object(map))) => (Self::from_map(&map), LoadStatus::Loaded),
            Ok(Some(_)) => {
                warn!(path = %path.display(), "settings root is not a JSON object, using defaults");
                (Self::default(), LoadStatus::Malformed)
            }
            Err(e) => {
                let error = format!("{e:#}");
                warn!(%error, "settings unusable, using defaults");
                (Self::default(), LoadStatus::Malformed)
            }
        }
    }

    /// Applies every well-typed field of `map` over the defaults. Each key is
    /// checked on its own; a wrong-typed value leaves its default in place.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut snapshot = Self::default();

        if let Some(v) = field(map, KEY_ENABLE_SOFTWARE_AUTOSTART, Value::as_bool) {
            snapshot.enable_software_autostart = v;
        }
        if let Some(v) = field(map, KEY_ALLOW_OTHER_SOFTWARE, Value::as_bool) {
            snapshot.allow_other_software = v;
        }
        if let Some(v) = field(map, KEY_CUSTOM_STARTUP_PROGRAM_PATH, |v| {
            v.as_str().map(str::to_owned)
        }) {
            snapshot.custom_startup_program_path = v;
        }
        if let Some(v) = field(map, KEY_AUTO_HIGH_PRIORITY, Value::as_bool) {
            snapshot.auto_high_priority = v;
        }
        if let Some(v) = field(map, KEY_USE_CUSTOM_FPS, Value::as_bool) {
            snapshot.use_custom_fps = v;
        }
        if let Some(v) = field(map, KEY_CUSTOM_FPS, |v| {
            v.as_i64().and_then(|n| i32::try_from(n).ok())
        }) {
            snapshot.custom_fps = v;
        }
        if let Some(v) = field(map, KEY_ENABLED_GKS, |v| {
            v.as_array().map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_owned))
                    .collect::<Vec<_>>()
            })
        }) {
            snapshot.extra_capabilities = v;
        }

        snapshot
    }

    /// The program to launch in place of the default startup routine, if
    /// other software is allowed and a path is configured.
    pub fn custom_startup_program(&self) -> Option<&str> {
        if self.allow_other_software && !self.custom_startup_program_path.is_empty() {
            Some(&self.custom_startup_program_path)
        } else {
            None
        }
    }
}

fn field<'a, T>(
    map: &'a Map<String, Value>,
    key: &str,
    extract: impl Fn(&'a Value) -> Option<T>,
) -> Option<T> {
    let value = map.get(key)?;
    let extracted = extract(value);
    if extracted.is_none() {
        trace!(key, "ignoring settings field of unexpected type");
    }
    extracted
}
