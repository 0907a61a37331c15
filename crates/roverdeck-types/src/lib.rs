use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Path of the read-only health endpoint on the robot control API.
pub const HEALTH_ENDPOINT: &str = "/healthz";

/// Drive speed sent with every keyboard `/move` command.
pub const DEFAULT_MOVE_SPEED: u16 = 140;

/// Drive direction understood by the robot's `/move` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Back,
    Left,
    Right,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Back => write!(f, "back"),
            Direction::Left => write!(f, "left"),
            Direction::Right => write!(f, "right"),
        }
    }
}

/// Whether the operator or the robot itself is in charge of locomotion.
///
/// While [`AutonomyMode::Autonomous`] the keyboard never produces movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutonomyMode {
    #[default]
    Manual,
    Autonomous,
}

impl std::fmt::Display for AutonomyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AutonomyMode::Manual => write!(f, "MANUAL"),
            AutonomyMode::Autonomous => write!(f, "AUTO"),
        }
    }
}

/// On-board behaviour selected on the robot, sent as an integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum RobotMode {
    Manual,
    #[default]
    Line,
    Avoid,
    Follow,
}

impl RobotMode {
    /// Wire code of this mode (`0..=3`).
    pub fn code(self) -> u8 {
        match self {
            RobotMode::Manual => 0,
            RobotMode::Line => 1,
            RobotMode::Avoid => 2,
            RobotMode::Follow => 3,
        }
    }

    /// Short display label.
    pub fn label(self) -> &'static str {
        match self {
            RobotMode::Manual => "MANUAL",
            RobotMode::Line => "LINE",
            RobotMode::Avoid => "AVOID",
            RobotMode::Follow => "FOLLOW",
        }
    }
}

impl From<RobotMode> for u8 {
    fn from(mode: RobotMode) -> Self {
        mode.code()
    }
}

impl TryFrom<u8> for RobotMode {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(RobotMode::Manual),
            1 => Ok(RobotMode::Line),
            2 => Ok(RobotMode::Avoid),
            3 => Ok(RobotMode::Follow),
            other => Err(format!("unknown robot mode code {other}")),
        }
    }
}

impl std::str::FromStr for RobotMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" | "none" => Ok(RobotMode::Manual),
            "line" => Ok(RobotMode::Line),
            "avoid" => Ok(RobotMode::Avoid),
            "follow" => Ok(RobotMode::Follow),
            other => Err(format!("unknown robot mode '{other}'")),
        }
    }
}

/// A state-changing request to the robot control API.
///
/// Serialises to exactly the JSON body the matching endpoint expects, e.g.
/// `Move` becomes `{"direction":"forward","speed":140}` and `Stop` becomes
/// `{}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RobotCommand {
    Move { direction: Direction, speed: u16 },
    Stop {},
    Mode { mode: RobotMode },
    Servo { servo_id: u8, angle: u16 },
    Lights { sequence: u8, r: u8, g: u8, b: u8 },
}

impl RobotCommand {
    /// Drive in `direction` at the default keyboard speed.
    pub fn drive(direction: Direction) -> Self {
        RobotCommand::Move {
            direction,
            speed: DEFAULT_MOVE_SPEED,
        }
    }

    pub fn stop() -> Self {
        RobotCommand::Stop {}
    }

    /// Endpoint path this command is posted to.
    pub fn endpoint(&self) -> &'static str {
        match self {
            RobotCommand::Move { .. } => "/move",
            RobotCommand::Stop {} => "/stop",
            RobotCommand::Mode { .. } => "/mode",
            RobotCommand::Servo { .. } => "/servo",
            RobotCommand::Lights { .. } => "/lights",
        }
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, RobotCommand::Stop {})
    }
}

/// Body of a `GET /healthz` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub connected: bool,
    #[serde(default)]
    pub esp_host: String,
    #[serde(default)]
    pub esp_port: u16,
    /// Most recent message the API received from the robot.
    #[serde(default)]
    pub last_rx: String,
}

/// Body of a response to any state-changing command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    #[serde(default)]
    pub last_rx: String,
}

/// Addresses of the robot control API and its camera stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub api_url: String,
    pub camera_url: String,
}

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_CAMERA_URL: &str = "http://192.168.4.1:81/stream";

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            camera_url: DEFAULT_CAMERA_URL.to_string(),
        }
    }
}

/// Connectivity to the robot control API as last observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub connected: bool,
    pub last_received_message: String,
    /// Time of the last successful health response.
    pub last_seen: Option<DateTime<Utc>>,
}

/// Health of the camera stream, derived from frame load/error outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHealth {
    pub connected: bool,
    pub observed_fps: u32,
}

/// Error taxonomy for the teleop client.
///
/// Network and protocol failures never reach the operator as errors; the
/// session folds them into the connectivity flag.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeckError {
    /// Transport failure: DNS, connection refused, timeout.
    #[error("Network error: {0}")]
    Network(String),

    /// The response could not be decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The control is not available at the current panel level.
    #[error("Control locked: {0}")]
    Locked(String),

    /// The session event loop has shut down.
    #[error("Session channel closed: {0}")]
    Channel(String),
}
