//! Staged endpoint edits for the settings flow.
//!
//! Edits go into a [`SettingsDraft`] and are probed there; nothing reaches
//! the session until [`SettingsDraft::save`] hands back a complete
//! [`EndpointConfig`] to apply in one step.

use roverdeck_gateway::Prober;
use roverdeck_types::EndpointConfig;
use serde::Serialize;
use tracing::info;

/// Outcome of the last reachability probe for one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ProbeStatus {
    #[default]
    Unknown,
    Testing,
    Connected,
    Failed,
}

impl ProbeStatus {
    pub fn label(self) -> &'static str {
        match self {
            ProbeStatus::Unknown => "UNK",
            ProbeStatus::Testing => "TEST",
            ProbeStatus::Connected => "OK",
            ProbeStatus::Failed => "FAIL",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDraft {
    pub api_url: String,
    pub camera_url: String,
    api_status: ProbeStatus,
    camera_status: ProbeStatus,
}

impl SettingsDraft {
    /// Start a draft from the committed endpoints.
    pub fn from_config(config: &EndpointConfig) -> Self {
        Self {
            api_url: config.api_url.clone(),
            camera_url: config.camera_url.clone(),
            api_status: ProbeStatus::Unknown,
            camera_status: ProbeStatus::Unknown,
        }
    }

    pub fn api_status(&self) -> ProbeStatus {
        self.api_status
    }

    pub fn camera_status(&self) -> ProbeStatus {
        self.camera_status
    }

    /// Probe the staged API URL.
    pub async fn probe_api(&mut self, prober: &Prober) -> ProbeStatus {
        self.api_status = ProbeStatus::Testing;
        self.api_status = match prober.probe_api(&self.api_url).await {
            Ok(()) => ProbeStatus::Connected,
            Err(e) => {
                info!(api_url = %self.api_url, error = %e, "API probe failed");
                ProbeStatus::Failed
            }
        };
        self.api_status
    }

    /// Probe the staged camera URL.
    pub async fn probe_camera(&mut self, prober: &Prober) -> ProbeStatus {
        self.camera_status = ProbeStatus::Testing;
        self.camera_status = match prober.probe_camera(&self.camera_url).await {
            Ok(()) => ProbeStatus::Connected,
            Err(e) => {
                info!(camera_url = %self.camera_url, error = %e, "camera probe failed");
                ProbeStatus::Failed
            }
        };
        self.camera_status
    }

    /// Commit: return the full staged config and reset the probe statuses.
    ///
    /// Probe results are advisory; saving never requires a passing probe.
    pub fn save(&mut self) -> EndpointConfig {
        self.reset_statuses();
        EndpointConfig {
            api_url: self.api_url.clone(),
            camera_url: self.camera_url.clone(),
        }
    }

    /// Discard staged edits, restoring `committed`.
    pub fn cancel(&mut self, committed: &EndpointConfig) {
        self.api_url = committed.api_url.clone();
        self.camera_url = committed.camera_url.clone();
        self.reset_statuses();
    }

    fn reset_statuses(&mut self) {
        self.api_status = ProbeStatus::Unknown;
        self.camera_status = ProbeStatus::Unknown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn committed() -> EndpointConfig {
        EndpointConfig {
            api_url: "http://robot:8000".into(),
            camera_url: "http://robot:81/stream".into(),
        }
    }

    #[test]
    fn labels() {
        assert_eq!(ProbeStatus::Unknown.label(), "UNK");
        assert_eq!(ProbeStatus::Testing.label(), "TEST");
        assert_eq!(ProbeStatus::Connected.label(), "OK");
        assert_eq!(ProbeStatus::Failed.label(), "FAIL");
    }

    #[test]
    fn save_returns_both_urls_together() {
        let mut draft = SettingsDraft::from_config(&committed());
        draft.api_url = "http://10.0.0.2:8000".into();
        draft.camera_url = "http://10.0.0.3/stream".into();
        let saved = draft.save();
        assert_eq!(saved.api_url, "http://10.0.0.2:8000");
        assert_eq!(saved.camera_url, "http://10.0.0.3/stream");
        assert_eq!(draft.api_status(), ProbeStatus::Unknown);
    }

    #[test]
    fn cancel_restores_committed_values() {
        let mut draft = SettingsDraft::from_config(&committed());
        draft.api_url = "http://typo".into();
        draft.cancel(&committed());
        assert_eq!(draft, SettingsDraft::from_config(&committed()));
    }

    #[tokio::test]
    async fn unreachable_probe_marks_failed_and_save_resets() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut draft = SettingsDraft::from_config(&committed());
        draft.api_url = format!("http://{addr}");
        draft.camera_url = format!("http://{addr}/stream");
        let prober = Prober::new(Duration::from_millis(300));

        assert_eq!(draft.probe_api(&prober).await, ProbeStatus::Failed);
        assert_eq!(draft.probe_camera(&prober).await, ProbeStatus::Failed);
        assert_eq!(draft.camera_status(), ProbeStatus::Failed);

        draft.save();
        assert_eq!(draft.api_status(), ProbeStatus::Unknown);
        assert_eq!(draft.camera_status(), ProbeStatus::Unknown);
    }
}
