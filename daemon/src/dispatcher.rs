use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capability::{CapabilityRegistry, GatekeeperStatus};
use crate::config::ConfigSnapshot;
use crate::event::{ControllerEventKind, HmdEvent, InputEvent, LifecycleEvent};
use crate::host::HostActions;
use crate::launcher::{LaunchError, ProcessLauncher};
use crate::priority::OsPriority;

/// Activation mode passed to the host when a headset is attached or chosen.
pub const HEADSET_ACTIVATION_MODE: u32 = 2;

/// Controller slot that receives input focus alongside window focus.
const FOCUS_CONTROLLER_INDEX: u32 = 0;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("startup launch failed: {0}")]
    LaunchFailed(#[from] LaunchError),
}

/// Refresh-rate override reported for a headset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FpsSetting {
    pub fps: i32,
    pub use_fps_setting: bool,
}

/// Answer to a remote (IPC) headset client connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RemoteClientStatus {
    NotConnected = 1,
}

impl RemoteClientStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Turns host lifecycle events into host actions and process launches.
///
/// Dispatch is synchronous and expects one call at a time; a transport that
/// delivers from several threads must serialize calls itself.
pub struct LifecycleDispatcher<H, L> {
    config: ConfigSnapshot,
    registry: CapabilityRegistry,
    host: H,
    launcher: L,
    /// Set by the first `shutdown()`. Never consulted by `handle`.
    shut_down: AtomicBool,
}

impl<H: HostActions, L: ProcessLauncher> LifecycleDispatcher<H, L> {
    /// Builds the dispatcher from a loaded snapshot. Requests high process
    /// priority once if the snapshot asks for it; refusal is only logged.
    pub fn new(config: ConfigSnapshot, host: H, launcher: L, priority: &dyn OsPriority) -> Self {
        let registry = CapabilityRegistry::new(&config.extra_capabilities);
        info!(gatekeepers = registry.len(), "capability registry ready");

        if config.auto_high_priority {
            if priority.request_high_priority_for_current_process() {
                info!("process priority raised to high");
            } else {
                warn!("could not raise process priority, continuing at normal priority");
            }
        }

        Self {
            config,
            registry,
            host,
            launcher,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Applies policy for one event. A launch failure is returned after any
    /// host actions that preceded it have already been issued.
    pub fn handle(&self, event: &LifecycleEvent) -> Result<(), DispatchError> {
        match event {
            LifecycleEvent::ProcessCreated { pid } => {
                self.on_process_created(*pid);
                Ok(())
            }
            LifecycleEvent::Input { serial, event } => self.on_input(serial, *event),
            LifecycleEvent::Hmd { serial, event } => self.on_hmd(serial, *event),
            LifecycleEvent::SetDefaultHeadset { serial } => {
                info!(serial = %serial, "default headset set");
                self.activate_and_autostart(serial)
            }
            LifecycleEvent::AirLinkPairingStarted { serial, .. } => {
                debug!(serial = %serial, "air link pairing started");
                Ok(())
            }
        }
    }

    fn on_process_created(&self, pid: u32) {
        info!(pid, "new process");
        // Only SteamVR's vrserver gets the headset unless other software is allowed.
        if !(self.config.allow_other_software || self.launcher.is_vr_server(pid)) {
            return;
        }
        self.host.set_tracking(true);
        self.host.set_modal_overlay(false);
        self.host.set_depth_buffer_request(false);
        self.host.set_window_focus(pid);
        self.host.set_input_focus(pid, FOCUS_CONTROLLER_INDEX);
    }

    fn on_input(&self, serial: &str, event: InputEvent) -> Result<(), DispatchError> {
        match event {
            InputEvent::Controller {
                kind: ControllerEventKind::OculusButton,
                pressed: true,
            } => {
                debug!(serial, "oculus button pressed");
                self.launch_startup()
            }
            InputEvent::Controller { .. } => Ok(()),
            InputEvent::ProximitySensor | InputEvent::DeviceMotion => Ok(()),
        }
    }

    fn on_hmd(&self, serial: &str, event: HmdEvent) -> Result<(), DispatchError> {
        match event {
            HmdEvent::DisplayAttached => {
                info!(serial, "headset display attached");
                self.activate_and_autostart(serial)
            }
            HmdEvent::DisplayDetached | HmdEvent::Mounted | HmdEvent::Unmounted => Ok(()),
        }
    }

    fn activate_and_autostart(&self, serial: &str) -> Result<(), DispatchError> {
        self.host.activate_headset(serial, HEADSET_ACTIVATION_MODE);
        if self.config.enable_software_autostart {
            self.launch_startup()?;
        }
        Ok(())
    }

    /// Launches the custom startup program when allowed, else the default
    /// startup routine.
    fn launch_startup(&self) -> Result<(), DispatchError> {
        let handle = match self.config.custom_startup_program() {
            Some(path) => self.launcher.start(path),
            None => self.launcher.start_default_startup(),
        };
        match handle {
            Ok(handle) => {
                debug!(pid = handle.pid, "startup launched");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "startup launch failed");
                Err(e.into())
            }
        }
    }

    pub fn query_capability(&self, name: &str) -> GatekeeperStatus {
        self.registry.query(name)
    }

    /// The same setting is returned for every headset; `serial` is accepted
    /// for the host's signature but does not select a per-device value.
    pub fn fps_setting_for_headset(&self, _serial: &str) -> FpsSetting {
        FpsSetting {
            fps: self.config.custom_fps,
            use_fps_setting: self.config.use_custom_fps,
        }
    }

    /// Remote headset clients over IPC are not supported.
    pub fn connect_remote_headset_client(&self) -> RemoteClientStatus {
        RemoteClientStatus::NotConnected
    }

    /// Idempotent teardown. Only the first call logs.
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            info!("dispatcher shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostAction;
    use crate::launcher::LaunchHandle;
    use std::sync::{Arc, Mutex};

    /// Every collaborator call, in the order it happened.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Host(HostAction),
        Start(String),
        StartDefault,
    }

    type CallLog = Arc<Mutex<Vec<Call>>>;

    struct FakeHost {
        calls: CallLog,
    }

    impl FakeHost {
        fn record(&self, action: HostAction) {
            self.calls.lock().unwrap().push(Call::Host(action));
        }
    }

    impl HostActions for FakeHost {
        fn set_tracking(&self, enabled: bool) {
            self.record(HostAction::SetTracking { enabled });
        }
        fn set_modal_overlay(&self, enabled: bool) {
            self.record(HostAction::SetModalOverlay { enabled });
        }
        fn set_depth_buffer_request(&self, enabled: bool) {
            self.record(HostAction::SetDepthBufferRequest { enabled });
        }
        fn set_window_focus(&self, pid: u32) {
            self.record(HostAction::SetWindowFocus { pid });
        }
        fn set_input_focus(&self, pid: u32, controller_index: u32) {
            self.record(HostAction::SetInputFocus { pid, controller_index });
        }
        fn activate_headset(&self, serial: &str, mode: u32) {
            self.record(HostAction::ActivateHeadset {
                serial: serial.to_string(),
                mode,
            });
        }
    }

    struct FakeLauncher {
        calls: CallLog,
        vr_server_pids: Vec<u32>,
        vr_server_checks: Arc<Mutex<Vec<u32>>>,
        fail: bool,
    }

    impl FakeLauncher {
        fn outcome(&self) -> Result<LaunchHandle, LaunchError> {
            if self.fail {
                Err(LaunchError::Spawn {
                    program: "fake".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                })
            } else {
                Ok(LaunchHandle { pid: 1000 })
            }
        }
    }

    impl ProcessLauncher for FakeLauncher {
        fn start(&self, path: &str) -> Result<LaunchHandle, LaunchError> {
            self.calls.lock().unwrap().push(Call::Start(path.to_string()));
            self.outcome()
        }
        fn start_default_startup(&self) -> Result<LaunchHandle, LaunchError> {
            self.calls.lock().unwrap().push(Call::StartDefault);
            self.outcome()
        }
        fn is_vr_server(&self, pid: u32) -> bool {
            self.vr_server_checks.lock().unwrap().push(pid);
            self.vr_server_pids.contains(&pid)
        }
    }

    struct FakePriority {
        grant: bool,
        requests: Mutex<u32>,
    }

    impl FakePriority {
        fn new(grant: bool) -> Self {
            Self {
                grant,
                requests: Mutex::new(0),
            }
        }
    }

    impl OsPriority for FakePriority {
        fn request_high_priority_for_current_process(&self) -> bool {
            *self.requests.lock().unwrap() += 1;
            self.grant
        }
    }

    struct Harness {
        dispatcher: LifecycleDispatcher<FakeHost, FakeLauncher>,
        calls: CallLog,
        vr_server_checks: Arc<Mutex<Vec<u32>>>,
    }

    impl Harness {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn build(config: ConfigSnapshot, vr_server_pids: &[u32], fail_launch: bool) -> Harness {
        let calls: CallLog = Arc::default();
        let vr_server_checks = Arc::new(Mutex::new(Vec::new()));
        let host = FakeHost {
            calls: Arc::clone(&calls),
        };
        let launcher = FakeLauncher {
            calls: Arc::clone(&calls),
            vr_server_pids: vr_server_pids.to_vec(),
            vr_server_checks: Arc::clone(&vr_server_checks),
            fail: fail_launch,
        };
        let dispatcher = LifecycleDispatcher::new(config, host, launcher, &FakePriority::new(true));
        Harness {
            dispatcher,
            calls,
            vr_server_checks,
        }
    }

    fn harness(config: ConfigSnapshot) -> Harness {
        build(config, &[], false)
    }

    fn focus_sequence(pid: u32) -> Vec<Call> {
        vec![
            Call::Host(HostAction::SetTracking { enabled: true }),
            Call::Host(HostAction::SetModalOverlay { enabled: false }),
            Call::Host(HostAction::SetDepthBufferRequest { enabled: false }),
            Call::Host(HostAction::SetWindowFocus { pid }),
            Call::Host(HostAction::SetInputFocus {
                pid,
                controller_index: 0,
            }),
        ]
    }

    fn activate(serial: &str) -> Call {
        Call::Host(HostAction::ActivateHeadset {
            serial: serial.to_string(),
            mode: HEADSET_ACTIVATION_MODE,
        })
    }

    fn oculus_button(pressed: bool) -> LifecycleEvent {
        LifecycleEvent::Input {
            serial: "CTRL1".to_string(),
            event: InputEvent::Controller {
                kind: ControllerEventKind::OculusButton,
                pressed,
            },
        }
    }

    fn attached(serial: &str) -> LifecycleEvent {
        LifecycleEvent::Hmd {
            serial: serial.to_string(),
            event: HmdEvent::DisplayAttached,
        }
    }

    fn allow_with_custom_path() -> ConfigSnapshot {
        ConfigSnapshot {
            allow_other_software: true,
            custom_startup_program_path: "C:/app.exe".to_string(),
            ..Default::default()
        }
    }

    // ── construction ──────────────────────────────────────────────────────────

    #[test]
    fn construction_requests_priority_only_when_configured() {
        let priority = FakePriority::new(true);
        let calls: CallLog = Arc::default();
        let make = |config: ConfigSnapshot| {
            LifecycleDispatcher::new(
                config,
                FakeHost {
                    calls: Arc::clone(&calls),
                },
                FakeLauncher {
                    calls: Arc::clone(&calls),
                    vr_server_pids: Vec::new(),
                    vr_server_checks: Arc::default(),
                    fail: false,
                },
                &priority,
            )
        };

        make(ConfigSnapshot::default());
        assert_eq!(*priority.requests.lock().unwrap(), 0);

        make(ConfigSnapshot {
            auto_high_priority: true,
            ..Default::default()
        });
        assert_eq!(*priority.requests.lock().unwrap(), 1);
    }

    #[test]
    fn refused_priority_does_not_abort_construction() {
        let priority = FakePriority::new(false);
        let config = ConfigSnapshot {
            auto_high_priority: true,
            ..Default::default()
        };
        let d = LifecycleDispatcher::new(
            config,
            FakeHost {
                calls: Arc::default(),
            },
            FakeLauncher {
                calls: Arc::default(),
                vr_server_pids: Vec::new(),
                vr_server_checks: Arc::default(),
                fail: false,
            },
            &priority,
        );
        assert_eq!(*priority.requests.lock().unwrap(), 1);
        assert_eq!(d.query_capability("oculus_allow_hevc_on_amd"), GatekeeperStatus::Ok);
    }

    #[test]
    fn registry_includes_configured_extras() {
        let h = harness(ConfigSnapshot {
            extra_capabilities: vec!["custom_flag_a".to_string()],
            ..Default::default()
        });
        assert_eq!(h.dispatcher.registry().len(), 5);
        assert_eq!(h.dispatcher.query_capability("custom_flag_abc"), GatekeeperStatus::Ok);
        assert_eq!(h.dispatcher.query_capability("custom"), GatekeeperStatus::Unknown);
    }

    // ── ProcessCreated ────────────────────────────────────────────────────────

    #[test]
    fn unknown_process_gets_nothing_without_allowance() {
        let h = harness(ConfigSnapshot::default());
        h.dispatcher
            .handle(&LifecycleEvent::ProcessCreated { pid: 42 })
            .unwrap();
        assert!(h.calls().is_empty());
        assert_eq!(*h.vr_server_checks.lock().unwrap(), vec![42]);
    }

    #[test]
    fn vr_server_process_gets_focus() {
        let h = build(ConfigSnapshot::default(), &[7], false);
        h.dispatcher
            .handle(&LifecycleEvent::ProcessCreated { pid: 7 })
            .unwrap();
        assert_eq!(h.calls(), focus_sequence(7));
    }

    #[test]
    fn allow_other_software_focuses_any_process_without_checking() {
        let h = harness(ConfigSnapshot {
            allow_other_software: true,
            ..Default::default()
        });
        h.dispatcher
            .handle(&LifecycleEvent::ProcessCreated { pid: 42 })
            .unwrap();
        assert_eq!(h.calls(), focus_sequence(42));
        assert!(h.vr_server_checks.lock().unwrap().is_empty());
    }

    // ── controller input ──────────────────────────────────────────────────────

    #[test]
    fn oculus_button_without_allowance_runs_default_startup() {
        let h = harness(ConfigSnapshot {
            custom_startup_program_path: "C:/app.exe".to_string(),
            ..Default::default()
        });
        h.dispatcher.handle(&oculus_button(true)).unwrap();
        assert_eq!(h.calls(), vec![Call::StartDefault]);
    }

    #[test]
    fn oculus_button_with_allowance_and_path_runs_custom_program() {
        let h = harness(allow_with_custom_path());
        h.dispatcher.handle(&oculus_button(true)).unwrap();
        assert_eq!(h.calls(), vec![Call::Start("C:/app.exe".to_string())]);
    }

    #[test]
    fn oculus_button_with_allowance_but_empty_path_runs_default_startup() {
        let h = harness(ConfigSnapshot {
            allow_other_software: true,
            ..Default::default()
        });
        h.dispatcher.handle(&oculus_button(true)).unwrap();
        assert_eq!(h.calls(), vec![Call::StartDefault]);
    }

    #[test]
    fn oculus_button_release_and_other_input_are_inert() {
        let h = harness(allow_with_custom_path());
        let serial = "CTRL1".to_string();
        let events = [
            oculus_button(false),
            LifecycleEvent::Input {
                serial: serial.clone(),
                event: InputEvent::Controller {
                    kind: ControllerEventKind::Other,
                    pressed: true,
                },
            },
            LifecycleEvent::Input {
                serial: serial.clone(),
                event: InputEvent::ProximitySensor,
            },
            LifecycleEvent::Input {
                serial,
                event: InputEvent::DeviceMotion,
            },
        ];
        for event in &events {
            h.dispatcher.handle(event).unwrap();
        }
        assert!(h.calls().is_empty());
    }

    // ── headset events ────────────────────────────────────────────────────────

    #[test]
    fn attach_with_autostart_activates_then_launches_custom_program() {
        let h = harness(ConfigSnapshot {
            enable_software_autostart: true,
            ..allow_with_custom_path()
        });
        h.dispatcher.handle(&attached("HMD1")).unwrap();
        assert_eq!(
            h.calls(),
            vec![activate("HMD1"), Call::Start("C:/app.exe".to_string())]
        );
    }

    #[test]
    fn attach_without_autostart_only_activates() {
        let h = harness(allow_with_custom_path());
        h.dispatcher.handle(&attached("HMD1")).unwrap();
        assert_eq!(h.calls(), vec![activate("HMD1")]);
    }

    #[test]
    fn attach_with_autostart_and_no_allowance_runs_default_startup() {
        let h = harness(ConfigSnapshot {
            enable_software_autostart: true,
            custom_startup_program_path: "C:/app.exe".to_string(),
            ..Default::default()
        });
        h.dispatcher.handle(&attached("HMD2")).unwrap();
        assert_eq!(h.calls(), vec![activate("HMD2"), Call::StartDefault]);
    }

    #[test]
    fn other_hmd_events_are_inert() {
        let h = harness(ConfigSnapshot {
            enable_software_autostart: true,
            ..Default::default()
        });
        for event in [HmdEvent::DisplayDetached, HmdEvent::Mounted, HmdEvent::Unmounted] {
            h.dispatcher
                .handle(&LifecycleEvent::Hmd {
                    serial: "HMD1".to_string(),
                    event,
                })
                .unwrap();
        }
        assert!(h.calls().is_empty());
    }

    #[test]
    fn set_default_headset_matches_attach_policy() {
        let h = harness(ConfigSnapshot {
            enable_software_autostart: true,
            ..allow_with_custom_path()
        });
        h.dispatcher
            .handle(&LifecycleEvent::SetDefaultHeadset {
                serial: "HMD3".to_string(),
            })
            .unwrap();
        assert_eq!(
            h.calls(),
            vec![activate("HMD3"), Call::Start("C:/app.exe".to_string())]
        );
    }

    #[test]
    fn set_default_headset_without_autostart_only_activates() {
        let h = harness(ConfigSnapshot::default());
        h.dispatcher
            .handle(&LifecycleEvent::SetDefaultHeadset {
                serial: "HMD3".to_string(),
            })
            .unwrap();
        assert_eq!(h.calls(), vec![activate("HMD3")]);
    }

    #[test]
    fn air_link_pairing_is_inert() {
        let h = harness(allow_with_custom_path());
        h.dispatcher
            .handle(&LifecycleEvent::AirLinkPairingStarted {
                pairing_code: "1234".to_string(),
                serial: "HMD1".to_string(),
            })
            .unwrap();
        assert!(h.calls().is_empty());
    }

    // ── launch failures ───────────────────────────────────────────────────────

    #[test]
    fn launch_failure_is_returned_after_activation() {
        let config = ConfigSnapshot {
            enable_software_autostart: true,
            ..Default::default()
        };
        let h = build(config, &[], true);
        let result = h.dispatcher.handle(&attached("HMD1"));
        assert!(matches!(result, Err(DispatchError::LaunchFailed(_))));
        assert_eq!(h.calls(), vec![activate("HMD1"), Call::StartDefault]);
    }

    #[test]
    fn launch_failure_does_not_block_later_events() {
        let h = build(ConfigSnapshot::default(), &[7], true);
        assert!(h.dispatcher.handle(&oculus_button(true)).is_err());
        h.dispatcher
            .handle(&LifecycleEvent::ProcessCreated { pid: 7 })
            .unwrap();
        let mut expected = vec![Call::StartDefault];
        expected.extend(focus_sequence(7));
        assert_eq!(h.calls(), expected);
    }

    // ── direct calls ──────────────────────────────────────────────────────────

    #[test]
    fn fps_setting_ignores_serial() {
        let h = harness(ConfigSnapshot {
            use_custom_fps: true,
            custom_fps: 90,
            ..Default::default()
        });
        let expected = FpsSetting {
            fps: 90,
            use_fps_setting: true,
        };
        assert_eq!(h.dispatcher.fps_setting_for_headset("HMD1"), expected);
        assert_eq!(h.dispatcher.fps_setting_for_headset("OTHER"), expected);
        assert_eq!(h.dispatcher.fps_setting_for_headset(""), expected);
    }

    #[test]
    fn remote_headset_client_is_never_connected() {
        let h = harness(ConfigSnapshot::default());
        let status = h.dispatcher.connect_remote_headset_client();
        assert_eq!(status, RemoteClientStatus::NotConnected);
        assert_eq!(status.code(), 1);
    }

    // ── shutdown ──────────────────────────────────────────────────────────────

    #[test]
    fn shutdown_is_idempotent() {
        let h = harness(ConfigSnapshot::default());
        assert!(!h.dispatcher.is_shut_down());
        h.dispatcher.shutdown();
        h.dispatcher.shutdown();
        assert!(h.dispatcher.is_shut_down());
        assert!(h.calls().is_empty());
    }

    #[test]
    fn events_after_shutdown_are_still_dispatched() {
        let h = build(ConfigSnapshot::default(), &[7], false);
        h.dispatcher.shutdown();
        h.dispatcher
            .handle(&LifecycleEvent::ProcessCreated { pid: 7 })
            .unwrap();
        assert_eq!(h.calls(), focus_sequence(7));
    }
}
