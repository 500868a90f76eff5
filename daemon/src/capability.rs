use tracing::{debug, info};

/// Gatekeepers granted on every install, ahead of any configured extras.
pub const BUILTIN_CAPABILITIES: [&str; 4] = [
    "oculus_compositor_phase_sync",
    "oculus_compositor_asw_toggle",
    // Required for 120 Hz on Quest 3 over Link.
    "oculus_link_allow_stinson_120fps",
    "oculus_allow_hevc_on_amd",
];

/// Answer to a gatekeeper fetch. The discriminants are the host's wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GatekeeperStatus {
    Ok = 0,
    Unknown = 2,
}

impl GatekeeperStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Allow-list of gatekeeper names. Filled once at construction.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    enabled: Vec<String>,
}

impl CapabilityRegistry {
    /// Seeds the built-ins, then appends `extra` in order. Duplicates are kept.
    pub fn new(extra: &[String]) -> Self {
        let enabled = BUILTIN_CAPABILITIES
            .iter()
            .map(|name| name.to_string())
            .chain(extra.iter().cloned())
            .collect();
        Self { enabled }
    }

    /// `Ok` iff some registry entry is a byte prefix of `name`.
    ///
    /// The comparison runs over the entry's length, so an entry acts as a
    /// family prefix: `oculus_foo` grants `oculus_foo_bar`, while a query of
    /// `oculus` is not granted by `oculus_foo`.
    pub fn query(&self, name: &str) -> GatekeeperStatus {
        let granted = self
            .enabled
            .iter()
            .any(|entry| name.as_bytes().starts_with(entry.as_bytes()));
        if granted {
            debug!(gatekeeper = name, "gatekeeper granted");
            GatekeeperStatus::Ok
        } else {
            info!(gatekeeper = name, "gatekeeper not in allow-list");
            GatekeeperStatus::Unknown
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.enabled
    }

    pub fn len(&self) -> usize {
        self.enabled.len()
    }
}
