//! The robot-link seam.
//!
//! The session never talks HTTP directly.  It holds an `Arc<dyn RobotLink>`
//! and an `Arc<dyn FrameSource>`; [`CommandGateway`][crate::gateway::CommandGateway]
//! and [`HttpFrameSource`][crate::frames::HttpFrameSource] are the production
//! implementations, tests substitute in-process mocks.

use async_trait::async_trait;
use roverdeck_types::{CommandReply, DeckError, HealthStatus, RobotCommand};
use tokio::sync::mpsc;

/// Request/response access to the robot control API.
///
/// # Contract
///
/// * `health` – read-only `GET {api_url}/healthz`.
/// * `send` – state-changing `POST {api_url}{command.endpoint()}` with the
///   command's JSON body.
///
/// Both fail with [`DeckError::Network`] on transport failure and
/// [`DeckError::Protocol`] when the body cannot be decoded; callers treat
/// either as "connection down".
#[async_trait]
pub trait RobotLink: Send + Sync {
    async fn health(&self, api_url: &str) -> Result<HealthStatus, DeckError>;

    async fn send(&self, api_url: &str, command: &RobotCommand) -> Result<CommandReply, DeckError>;
}

/// Source of camera frames.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Open the camera at `url` and report the byte size of every frame it
    /// yields on `frames`.
    ///
    /// A still image yields one frame and returns.  An MJPEG stream yields a
    /// frame per part until the camera closes it.  Returns `Ok` once the
    /// source ends or `frames` is closed; a failed connection, a non-2xx
    /// status or a source that ends without any frame is an error.
    async fn stream_frames(&self, url: &str, frames: mpsc::Sender<usize>) -> Result<(), DeckError>;
}
