//! One-shot reachability probes used by the settings flow.
//!
//! Unlike health polling, a probe only answers "is something listening and
//! returning 2xx"; the response body is never inspected.  A probe that runs
//! past its deadline is reported exactly like a failed one.

use std::time::Duration;

use roverdeck_types::{DeckError, HEALTH_ENDPOINT};
use tracing::debug;

use crate::gateway::join_url;

/// Deadline applied to every reachability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Probes candidate endpoints before they are committed.
#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for Prober {
    fn default() -> Self {
        Self::new(PROBE_TIMEOUT)
    }
}

impl Prober {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// `GET {api_url}/healthz`, succeeding on any 2xx status.
    pub async fn probe_api(&self, api_url: &str) -> Result<(), DeckError> {
        let url = join_url(api_url, HEALTH_ENDPOINT);
        self.check(self.client.get(&url), &url).await
    }

    /// `HEAD {camera_url}`, succeeding on any 2xx status.
    pub async fn probe_camera(&self, camera_url: &str) -> Result<(), DeckError> {
        self.check(self.client.head(camera_url), camera_url).await
    }

    async fn check(&self, request: reqwest::RequestBuilder, url: &str) -> Result<(), DeckError> {
        let response = request.timeout(self.timeout).send().await.map_err(|e| {
            if e.is_timeout() {
                DeckError::Network(format!("{url}: no answer within {:?}", self.timeout))
            } else {
                DeckError::Network(format!("{url}: {e}"))
            }
        })?;
        let status = response.status();
        debug!(%url, %status, "probe answered");
        if status.is_success() {
            Ok(())
        } else {
            Err(DeckError::Network(format!("{url}: HTTP {status}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{serve_once, serve_silent};

    #[test]
    fn default_timeout_is_three_seconds() {
        assert_eq!(Prober::default().timeout(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn api_probe_hits_healthz_with_get() {
        let (base, request) = serve_once("200 OK", r#"{"connected":false}"#).await;
        Prober::default().probe_api(&base).await.unwrap();
        let seen = request.await.unwrap();
        assert!(seen.starts_with("GET /healthz "), "got: {seen}");
    }

    #[tokio::test]
    async fn api_probe_fails_on_error_status() {
        let (base, _request) = serve_once("503 Service Unavailable", "{}").await;
        let err = Prober::default().probe_api(&base).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn camera_probe_uses_head() {
        let (base, request) = serve_once("200 OK", "").await;
        let url = format!("{base}/stream");
        Prober::default().probe_camera(&url).await.unwrap();
        let seen = request.await.unwrap();
        assert!(seen.starts_with("HEAD /stream "), "got: {seen}");
    }

    #[tokio::test]
    async fn silent_endpoint_times_out_as_failure() {
        let base = serve_silent().await;
        let prober = Prober::new(Duration::from_millis(150));
        let err = prober.probe_api(&base).await.unwrap_err();
        assert!(matches!(err, DeckError::Network(_)));
        assert!(err.to_string().contains("no answer"), "got: {err}");
    }

    #[tokio::test]
    async fn malformed_url_fails_like_network_error() {
        let err = Prober::default().probe_camera("not a url").await.unwrap_err();
        assert!(matches!(err, DeckError::Network(_)));
    }
}
