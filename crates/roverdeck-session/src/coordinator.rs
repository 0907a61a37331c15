//! [`SessionCoordinator`] – the single owner of teleop session state.
//!
//! Everything the operator sees is derived from state held here:
//! connectivity to the control API, camera stream health, autonomy and
//! robot mode, held keys and the committed endpoints.  Background work
//! (health polls, command sends, frame fetches) never touches that state.
//! It posts a [`SessionEvent`] instead, and the owner of the coordinator
//! feeds those events back through [`SessionCoordinator::apply`], usually by
//! looping on [`SessionCoordinator::process_next`].
//!
//! # Command ordering
//!
//! Commands are queued to one dispatcher task that sends them strictly in
//! order, so a key's `/move` always reaches the robot before its `/stop`.
//! Command replies and health replies may still interleave in any order;
//! [`Connectivity`] resolves that race pessimistically.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use roverdeck_gateway::{CommandGateway, HttpFrameSource};
//! use roverdeck_session::coordinator::{SessionConfig, SessionCoordinator};
//!
//! # async fn run() {
//! let mut session = SessionCoordinator::new(
//!     SessionConfig::default(),
//!     Arc::new(CommandGateway::new()),
//!     Arc::new(HttpFrameSource::new()),
//! );
//! session.start();
//! while session.process_next().await {
//!     println!("{}", session.snapshot().connection);
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use roverdeck_gateway::{FrameSource, RobotLink};
use roverdeck_types::{
    AutonomyMode, DEFAULT_MOVE_SPEED, DeckError, EndpointConfig, RobotCommand, RobotMode, StreamHealth,
};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::events::{CommandOutcome, EVENT_CAPACITY, SessionEvent};
use crate::health::{Connectivity, DEFAULT_POLL_INTERVAL, PollTask};
use crate::input::{ControlKey, InputTracker, KeyOutcome};
use crate::overlay::{CameraBanner, CameraOverlay};
use crate::panel::{LightPreset, PanelLevel, ServoPreset};
use crate::stream::{DEFAULT_FRAME_INTERVAL, StreamWatcher};

/// Longest telemetry text shown in the status line.
pub const TELEMETRY_DISPLAY_CHARS: usize = 20;

/// How long [`SessionCoordinator::shutdown`] waits for queued commands.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tunables for a [`SessionCoordinator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub endpoints: EndpointConfig,
    /// Period between health polls.
    pub poll_interval: Duration,
    /// Pause between camera frame fetches.
    pub frame_interval: Duration,
    /// Speed sent with every `/move`.
    pub move_speed: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoints: EndpointConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            move_speed: DEFAULT_MOVE_SPEED,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse integration state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Disconnected,
    ConnectedIdle,
    ConnectedStreaming,
}

impl SessionPhase {
    pub fn derive(api_connected: bool, stream: StreamHealth) -> Self {
        match (api_connected, stream.connected) {
            (false, _) => SessionPhase::Disconnected,
            (true, false) => SessionPhase::ConnectedIdle,
            (true, true) => SessionPhase::ConnectedStreaming,
        }
    }
}

/// Everything a front end needs to draw the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub phase: SessionPhase,
    /// `OK` or `ERR`.
    pub connection: &'static str,
    /// Last robot message, truncated.  `None` while disconnected so stale
    /// telemetry is never shown as live.
    pub telemetry: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
    pub autonomy: AutonomyMode,
    pub robot_mode: RobotMode,
    pub mode_label: &'static str,
    pub panel: PanelLevel,
    pub held_keys: Vec<ControlKey>,
    pub stream: StreamHealth,
    pub banner: CameraBanner,
    pub overlay: CameraOverlay,
    pub api_url: String,
    pub camera_url: String,
}

fn truncate_telemetry(message: &str) -> String {
    message.chars().take(TELEMETRY_DISPLAY_CHARS).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Dispatcher
// ─────────────────────────────────────────────────────────────────────────────

struct Dispatch {
    epoch: u64,
    api_url: String,
    command: RobotCommand,
}

async fn run_dispatcher(
    link: Arc<dyn RobotLink>,
    mut queue: mpsc::UnboundedReceiver<Dispatch>,
    events: mpsc::Sender<SessionEvent>,
) {
    while let Some(Dispatch { epoch, api_url, command }) = queue.recv().await {
        debug!(endpoint = command.endpoint(), %api_url, "sending command");
        let outcome = link.send(&api_url, &command).await;
        let event = SessionEvent::Command(CommandOutcome { epoch, command, outcome });
        // Keep draining the queue after the session stops listening.
        let _ = events.send(event).await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionCoordinator
// ─────────────────────────────────────────────────────────────────────────────

pub struct SessionCoordinator {
    id: Uuid,
    runtime: Handle,
    link: Arc<dyn RobotLink>,
    endpoints: EndpointConfig,
    poll_interval: Duration,
    connectivity: Connectivity,
    poll: Option<PollTask>,
    stream: StreamWatcher,
    /// `(camera_url, api_connected)` the stream was last configured for.
    stream_key: Option<(String, bool)>,
    input: InputTracker,
    autonomy: AutonomyMode,
    robot_mode: RobotMode,
    panel: PanelLevel,
    overlay: CameraOverlay,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    commands: mpsc::UnboundedSender<Dispatch>,
    dispatcher: JoinHandle<()>,
}

impl SessionCoordinator {
    /// Build a coordinator.
    ///
    /// Must be called from within a Tokio runtime.  The coordinator keeps a
    /// handle to that runtime and spawns all of its background work there,
    /// so every other method may be called from any thread.  The command
    /// dispatcher starts here; polling only begins on [`start`](Self::start).
    pub fn new(config: SessionConfig, link: Arc<dyn RobotLink>, frames: Arc<dyn FrameSource>) -> Self {
        let runtime = Handle::current();
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let (commands, queue) = mpsc::unbounded_channel();
        let dispatcher = runtime.spawn(run_dispatcher(Arc::clone(&link), queue, events_tx.clone()));

        Self {
            id: Uuid::new_v4(),
            stream: StreamWatcher::new(runtime.clone(), frames, config.frame_interval),
            runtime,
            link,
            endpoints: config.endpoints,
            poll_interval: config.poll_interval,
            connectivity: Connectivity::new(),
            poll: None,
            stream_key: None,
            input: InputTracker::new(config.move_speed),
            autonomy: AutonomyMode::Manual,
            robot_mode: RobotMode::default(),
            panel: PanelLevel::default(),
            overlay: CameraOverlay::default(),
            events_tx,
            events_rx,
            commands,
            dispatcher,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Begin health polling against the committed API URL.
    pub fn start(&mut self) {
        info!(session = %self.id, api_url = %self.endpoints.api_url, "session started");
        self.restart_polling();
        self.reconcile_stream();
    }

    pub fn is_polling(&self) -> bool {
        self.poll.is_some()
    }

    // ── Event loop ────────────────────────────────────────────────────────────

    /// Apply one background completion to the session state.
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Health(report) => {
                if self.connectivity.apply_report(&report) {
                    self.reconcile_stream();
                }
            }
            SessionEvent::Command(CommandOutcome { epoch, command, outcome }) => {
                if epoch != self.connectivity.epoch() {
                    debug!(endpoint = command.endpoint(), "reply for previous API discarded");
                    return;
                }
                match outcome {
                    Ok(reply) => self.connectivity.command_succeeded(&reply.last_rx),
                    Err(e) => {
                        warn!(endpoint = command.endpoint(), error = %e, "command failed; marking robot offline");
                        self.connectivity.command_failed();
                        self.reconcile_stream();
                    }
                }
            }
            SessionEvent::FrameLoaded { generation } => {
                self.stream.on_frame(generation, Instant::now());
            }
            SessionEvent::FrameFailed { generation, .. } => {
                self.stream.on_error(generation);
            }
        }
    }

    /// Receive and apply one event.  Returns `false` once the channel closes.
    pub async fn process_next(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.apply(event);
                true
            }
            None => false,
        }
    }

    /// Apply every event already queued without waiting.  Returns how many
    /// were applied.
    pub fn drain_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    // ── Keyboard ──────────────────────────────────────────────────────────────

    /// Key pressed (or auto-repeated).
    pub fn key_down(&mut self, key: ControlKey) -> Result<KeyOutcome, DeckError> {
        let outcome = self.input.key_down(key, self.autonomy);
        self.dispatch_outcome(&outcome)?;
        Ok(outcome)
    }

    /// Key released.
    pub fn key_up(&mut self, key: ControlKey) -> Result<KeyOutcome, DeckError> {
        let outcome = self.input.key_up(key, self.autonomy);
        self.dispatch_outcome(&outcome)?;
        Ok(outcome)
    }

    /// Forget held keys without sending anything.
    pub fn clear_held_keys(&mut self) {
        self.input.dispose();
    }

    fn dispatch_outcome(&self, outcome: &KeyOutcome) -> Result<(), DeckError> {
        match outcome {
            KeyOutcome::Command(command) => self.dispatch(command.clone()),
            KeyOutcome::Passthrough | KeyOutcome::Consumed => Ok(()),
        }
    }

    // ── Mutators ──────────────────────────────────────────────────────────────

    pub fn set_panel(&mut self, panel: PanelLevel) {
        info!(panel = panel.label(), "panel level changed");
        self.panel = panel;
    }

    /// Switch between operator and robot control of locomotion.
    pub fn set_autonomy(&mut self, autonomy: AutonomyMode) -> Result<(), DeckError> {
        if !self.panel.allows_autonomy_toggle() {
            return Err(DeckError::Locked(format!("autonomy toggle needs panel DEF or ADV, have {}", self.panel.label())));
        }
        info!(%autonomy, "autonomy changed");
        self.autonomy = autonomy;
        Ok(())
    }

    /// Select the robot's on-board behaviour.
    ///
    /// The local mode changes immediately and stays changed even if the
    /// `/mode` command later fails.
    pub fn set_robot_mode(&mut self, mode: RobotMode) -> Result<(), DeckError> {
        self.require_advanced("robot mode")?;
        info!(mode = mode.label(), "robot mode changed");
        self.robot_mode = mode;
        self.dispatch(RobotCommand::Mode { mode })
    }

    pub fn servo(&mut self, preset: ServoPreset) -> Result<(), DeckError> {
        self.require_advanced("servo")?;
        self.dispatch(preset.command())
    }

    pub fn lights(&mut self, preset: LightPreset) -> Result<(), DeckError> {
        self.require_advanced("lights")?;
        self.dispatch(preset.command())
    }

    /// Send `/stop` regardless of panel level or autonomy.
    pub fn send_stop(&mut self) -> Result<(), DeckError> {
        self.dispatch(RobotCommand::stop())
    }

    /// Commit new endpoints.
    ///
    /// A changed API URL cancels the running poll before the new one starts.
    /// The camera subscription is rebuilt when its URL changed or when
    /// connectivity was reset by the new API URL.
    pub fn apply_endpoints(&mut self, endpoints: EndpointConfig) {
        let api_changed = endpoints.api_url != self.endpoints.api_url;
        info!(api_url = %endpoints.api_url, camera_url = %endpoints.camera_url, "endpoints committed");
        self.endpoints = endpoints;
        if api_changed && self.poll.is_some() {
            self.restart_polling();
        }
        self.reconcile_stream();
    }

    /// Recompute the placeholder overlay counters.
    pub fn refresh_overlay<R: Rng>(&mut self, rng: &mut R) {
        self.overlay
            .refresh(self.connectivity.is_connected(), self.stream.health(), rng);
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn endpoints(&self) -> &EndpointConfig {
        &self.endpoints
    }

    pub fn autonomy(&self) -> AutonomyMode {
        self.autonomy
    }

    pub fn robot_mode(&self) -> RobotMode {
        self.robot_mode
    }

    pub fn panel(&self) -> PanelLevel {
        self.panel
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity.is_connected()
    }

    pub fn stream_health(&self) -> StreamHealth {
        self.stream.health()
    }

    /// Generation of the current camera subscription; bumped on every
    /// reattach.
    pub fn stream_generation(&self) -> u64 {
        self.stream.generation()
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::derive(self.connectivity.is_connected(), self.stream.health())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.connectivity.state();
        let stream = self.stream.health();
        SessionSnapshot {
            session_id: self.id.to_string(),
            phase: self.phase(),
            connection: if state.connected { "OK" } else { "ERR" },
            telemetry: state
                .connected
                .then(|| truncate_telemetry(&state.last_received_message)),
            last_seen: state.last_seen,
            autonomy: self.autonomy,
            robot_mode: self.robot_mode,
            mode_label: self.robot_mode.label(),
            panel: self.panel,
            held_keys: self.input.held_keys(),
            stream,
            banner: CameraBanner::for_state(state.connected, stream),
            overlay: self.overlay,
            api_url: self.endpoints.api_url.clone(),
            camera_url: self.endpoints.camera_url.clone(),
        }
    }

    /// Tear the session down.
    ///
    /// Polling and the camera loop stop at once and held keys are forgotten
    /// without a stop.  Commands already queued, such as an explicit
    /// [`send_stop`](Self::send_stop), still get up to two seconds to go out.
    pub async fn shutdown(self) {
        let Self {
            id,
            poll,
            mut stream,
            mut input,
            events_rx,
            commands,
            dispatcher,
            ..
        } = self;
        drop(poll);
        stream.dispose();
        input.dispose();
        drop(events_rx);
        drop(commands);
        if tokio::time::timeout(SHUTDOWN_GRACE, dispatcher).await.is_err() {
            warn!(session = %id, "queued commands abandoned at shutdown");
        }
        info!(session = %id, "session stopped");
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn dispatch(&self, command: RobotCommand) -> Result<(), DeckError> {
        let dispatch = Dispatch {
            epoch: self.connectivity.epoch(),
            api_url: self.endpoints.api_url.clone(),
            command,
        };
        self.commands
            .send(dispatch)
            .map_err(|_| DeckError::Channel("command dispatcher stopped".into()))
    }

    fn require_advanced(&self, control: &str) -> Result<(), DeckError> {
        if self.panel.allows_actuators() {
            Ok(())
        } else {
            Err(DeckError::Locked(format!("{control} needs panel ADV, have {}", self.panel.label())))
        }
    }

    fn restart_polling(&mut self) {
        if let Some(old) = self.poll.take() {
            old.cancel();
        }
        let epoch = self.connectivity.begin_epoch();
        self.poll = Some(PollTask::spawn(
            &self.runtime,
            Arc::clone(&self.link),
            self.endpoints.api_url.clone(),
            self.poll_interval,
            epoch,
            self.events_tx.clone(),
        ));
    }

    fn reconcile_stream(&mut self) {
        let key = (self.endpoints.camera_url.clone(), self.connectivity.is_connected());
        if self.stream_key.as_ref() == Some(&key) {
            return;
        }
        self.stream.reconfigure(&key.0, key.1, &self.events_tx);
        self.stream_key = Some(key);
    }
}
