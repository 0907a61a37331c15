//! `roverdeck-session` – teleop session core.
//!
//! Keeps a live picture of the robot and its camera, and turns operator
//! input into an ordered stream of robot commands.
//!
//! # Modules
//!
//! - [`coordinator`] – [`SessionCoordinator`]: owns all session state and
//!   applies background completions delivered as [`SessionEvent`]s.
//! - [`health`] – [`PollTask`] periodic `/healthz` polling and the
//!   pessimistic [`Connectivity`] policy.
//! - [`input`] – [`InputTracker`]: per-key press/release state machine.
//! - [`stream`] – [`StreamWatcher`]: camera frame loop and fps tracking.
//! - [`overlay`] – camera banner and placeholder detection counters.
//! - [`panel`] – control panel levels and actuator presets.
//! - [`settings`] – staged endpoint edits with reachability probes.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing].

pub mod coordinator;
pub mod events;
pub mod health;
pub mod input;
pub mod overlay;
pub mod panel;
pub mod settings;
pub mod stream;
pub mod telemetry;

pub use coordinator::{SessionConfig, SessionCoordinator, SessionPhase, SessionSnapshot};
pub use events::SessionEvent;
pub use health::{Connectivity, PollTask};
pub use input::{ControlKey, InputTracker, KeyOutcome};
pub use overlay::{CameraBanner, CameraOverlay};
pub use panel::{LightPreset, PanelLevel, ServoPreset};
pub use settings::{ProbeStatus, SettingsDraft};
pub use stream::{FpsCounter, StreamWatcher};
