use serde::Deserialize;

/// A lifecycle notification delivered by the VR runtime host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// The host observed a new process that may want headset focus.
    ProcessCreated { pid: u32 },
    /// Input from a tracked device.
    Input { serial: String, event: InputEvent },
    /// Headset state change.
    Hmd { serial: String, event: HmdEvent },
    /// The user picked a default headset in the host UI.
    SetDefaultHeadset { serial: String },
    /// Air Link pairing began. Carries no policy.
    AirLinkPairingStarted { pairing_code: String, serial: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    Controller { kind: ControllerEventKind, pressed: bool },
    ProximitySensor,
    DeviceMotion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerEventKind {
    OculusButton,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HmdEvent {
    DisplayAttached,
    DisplayDetached,
    Mounted,
    Unmounted,
}
