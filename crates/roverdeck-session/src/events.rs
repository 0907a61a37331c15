//! Completions delivered from background tasks to the coordinator.
//!
//! Background tasks never touch session state; they post a
//! [`SessionEvent`] and the coordinator applies it on its own loop.

use roverdeck_types::{CommandReply, DeckError, HealthStatus, RobotCommand};

/// Capacity of the coordinator's event channel.
pub const EVENT_CAPACITY: usize = 256;

/// Result of one health poll.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Polling epoch; bumped every time the API URL changes.
    pub epoch: u64,
    /// Tick number within the epoch, starting at 1.
    pub seq: u64,
    pub outcome: Result<HealthStatus, DeckError>,
}

/// Result of one command sent by the dispatcher.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub epoch: u64,
    pub command: RobotCommand,
    pub outcome: Result<CommandReply, DeckError>,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    Health(HealthReport),
    Command(CommandOutcome),
    /// A camera frame loaded for the subscription with this generation.
    FrameLoaded { generation: u64 },
    /// A camera frame failed to load; the subscription has stopped.
    FrameFailed { generation: u64, error: DeckError },
}
