//! [`CommandGateway`] – HTTP client for the robot control API.
//!
//! | Path | Method | Body |
//! |---|---|---|
//! | `/healthz` | GET | none |
//! | `/move` | POST | `{direction, speed}` |
//! | `/stop` | POST | `{}` |
//! | `/mode` | POST | `{mode}` |
//! | `/servo` | POST | `{servo_id, angle}` |
//! | `/lights` | POST | `{sequence, r, g, b}` |
//!
//! No timeout is imposed beyond what the transport provides.

use async_trait::async_trait;
use roverdeck_types::{CommandReply, DeckError, HEALTH_ENDPOINT, HealthStatus, RobotCommand};
use serde_json::Value;
use tracing::{debug, warn};

use crate::link::RobotLink;

/// Thin wrapper that issues requests to the robot control API and decodes
/// the JSON replies.
///
/// Construct once and share behind an `Arc`; the inner
/// [`reqwest::Client`] pools connections.
#[derive(Clone, Default)]
pub struct CommandGateway {
    client: reqwest::Client,
}

impl CommandGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a gateway around an existing client (e.g. one with proxy or TLS
    /// settings applied).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Issue a request to `endpoint` under `api_url` and return the decoded
    /// JSON reply.
    ///
    /// The health endpoint is fetched with a body-less `GET`; every other
    /// endpoint receives `payload` as a JSON `POST`.  The HTTP status is not
    /// inspected: a reply counts as long as its body decodes.
    ///
    /// # Errors
    ///
    /// [`DeckError::Network`] on any transport failure,
    /// [`DeckError::Protocol`] when the body is not JSON.
    pub async fn send_raw(&self, api_url: &str, endpoint: &str, payload: &Value) -> Result<Value, DeckError> {
        let url = join_url(api_url, endpoint);
        let request = if endpoint == HEALTH_ENDPOINT {
            self.client.get(&url)
        } else {
            self.client.post(&url).json(payload)
        };

        let response = request.send().await.map_err(|e| {
            warn!(%url, error = %e, "robot API request failed");
            DeckError::Network(format!("{url}: {e}"))
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DeckError::Network(format!("{url}: reading body: {e}")))?;
        debug!(%url, %status, bytes = text.len(), "robot API replied");

        serde_json::from_str(&text).map_err(|e| DeckError::Protocol(format!("{url}: {e}")))
    }
}

#[async_trait]
impl RobotLink for CommandGateway {
    async fn health(&self, api_url: &str) -> Result<HealthStatus, DeckError> {
        let value = self.send_raw(api_url, HEALTH_ENDPOINT, &Value::Null).await?;
        serde_json::from_value(value).map_err(|e| DeckError::Protocol(format!("health reply: {e}")))
    }

    async fn send(&self, api_url: &str, command: &RobotCommand) -> Result<CommandReply, DeckError> {
        let payload =
            serde_json::to_value(command).map_err(|e| DeckError::Protocol(format!("encoding command: {e}")))?;
        let value = self.send_raw(api_url, command.endpoint(), &payload).await?;
        serde_json::from_value(value).map_err(|e| DeckError::Protocol(format!("command reply: {e}")))
    }
}

/// Join a base URL and an endpoint path without doubling the slash.
pub fn join_url(base: &str, endpoint: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), endpoint)
}
