//! Health monitoring of the robot control API.
//!
//! Two pieces:
//!
//! * [`PollTask`] – a cancellable periodic task that polls `GET /healthz`
//!   once immediately and then on every interval tick.  Each poll runs in
//!   its own child task so a hung request never delays the next tick.
//!   Dropping or cancelling the task aborts the timer and every in-flight
//!   poll.
//! * [`Connectivity`] – the pessimistic connectivity policy.  Any failure,
//!   from a poll or from a command, clears `connected`; only a successful
//!   health reply can set it again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use roverdeck_gateway::RobotLink;
use roverdeck_types::ConnectionState;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::events::{HealthReport, SessionEvent};

/// Default health poll period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

// ─────────────────────────────────────────────────────────────────────────────
// PollTask
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a running health poll loop bound to one API URL.
pub struct PollTask {
    handle: JoinHandle<()>,
    epoch: u64,
    api_url: String,
}

impl PollTask {
    /// Start polling `api_url` every `period` on `runtime`, tagging reports
    /// with `epoch`.
    ///
    /// The first poll fires immediately.  The caller does not need to be
    /// inside the runtime.
    pub fn spawn(
        runtime: &Handle,
        link: Arc<dyn RobotLink>,
        api_url: String,
        period: Duration,
        epoch: u64,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        info!(%api_url, epoch, ?period, "health polling started");
        let url = api_url.clone();
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut in_flight = JoinSet::new();
            let mut seq = 0u64;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        seq += 1;
                        let link = Arc::clone(&link);
                        let url = url.clone();
                        let events = events.clone();
                        in_flight.spawn(async move {
                            let outcome = link.health(&url).await;
                            let report = HealthReport { epoch, seq, outcome };
                            if events.send(SessionEvent::Health(report)).await.is_err() {
                                debug!("session gone; dropping health report");
                            }
                        });
                    }
                    Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                }
            }
        });
        Self {
            handle,
            epoch,
            api_url,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Stop the timer and abort any poll still in flight.
    pub fn cancel(self) {
        // Drop does the work.
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.handle.abort();
        debug!(api_url = %self.api_url, epoch = self.epoch, "health polling stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connectivity
// ─────────────────────────────────────────────────────────────────────────────

/// Owner of [`ConnectionState`] and the rules for changing it.
#[derive(Debug, Default)]
pub struct Connectivity {
    state: ConnectionState,
    epoch: u64,
    last_seq: u64,
}

impl Connectivity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Start a new polling epoch for a new API URL.
    ///
    /// Nothing observed against the previous URL says anything about the new
    /// one, so the state drops back to disconnected until the first reply.
    pub fn begin_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.last_seq = 0;
        self.state = ConnectionState::default();
        self.epoch
    }

    /// Apply a health report.
    ///
    /// Returns `false` when the report was discarded because it belongs to
    /// an earlier epoch or is older than one already applied.
    pub fn apply_report(&mut self, report: &HealthReport) -> bool {
        if report.epoch != self.epoch || report.seq <= self.last_seq {
            debug!(epoch = report.epoch, seq = report.seq, "stale health report discarded");
            return false;
        }
        self.last_seq = report.seq;
        match &report.outcome {
            Ok(health) => {
                if health.connected != self.state.connected {
                    info!(connected = health.connected, "robot connectivity changed");
                }
                self.state.connected = health.connected;
                self.state.last_received_message = health.last_rx.clone();
                self.state.last_seen = Some(Utc::now());
            }
            Err(e) => {
                if self.state.connected {
                    warn!(error = %e, "health poll failed; marking robot offline");
                }
                self.state.connected = false;
            }
        }
        true
    }

    /// A command reply arrived: surface its message, leave connectivity alone.
    pub fn command_succeeded(&mut self, last_rx: &str) {
        self.state.last_received_message = last_rx.to_string();
    }

    /// A command failed: the connection is down until the next good poll.
    pub fn command_failed(&mut self) {
        self.state.connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use roverdeck_types::{CommandReply, DeckError, HealthStatus, RobotCommand};
    use std::sync::Mutex;

    fn ok_report(epoch: u64, seq: u64, last_rx: &str) -> HealthReport {
        HealthReport {
            epoch,
            seq,
            outcome: Ok(HealthStatus {
                connected: true,
                last_rx: last_rx.to_string(),
                ..Default::default()
            }),
        }
    }

    fn err_report(epoch: u64, seq: u64) -> HealthReport {
        HealthReport {
            epoch,
            seq,
            outcome: Err(DeckError::Network("refused".into())),
        }
    }

    #[test]
    fn success_then_failure_then_success() {
        let mut c = Connectivity::new();
        let epoch = c.begin_epoch();
        assert!(c.apply_report(&ok_report(epoch, 1, "OK")));
        assert!(c.is_connected());
        assert_eq!(c.state().last_received_message, "OK");

        assert!(c.apply_report(&err_report(epoch, 2)));
        assert!(!c.is_connected());

        assert!(c.apply_report(&ok_report(epoch, 3, "BACK")));
        assert!(c.is_connected());
        assert_eq!(c.state().last_received_message, "BACK");
    }

    #[test]
    fn reply_with_connected_false_keeps_offline() {
        let mut c = Connectivity::new();
        let epoch = c.begin_epoch();
        let report = HealthReport {
            epoch,
            seq: 1,
            outcome: Ok(HealthStatus {
                connected: false,
                last_rx: "ESP lost".into(),
                ..Default::default()
            }),
        };
        c.apply_report(&report);
        assert!(!c.is_connected());
        assert!(c.state().last_seen.is_some());
    }

    #[test]
    fn out_of_order_report_is_discarded() {
        let mut c = Connectivity::new();
        let epoch = c.begin_epoch();
        assert!(c.apply_report(&err_report(epoch, 2)));
        // Tick 1 was slow and finished after tick 2.
        assert!(!c.apply_report(&ok_report(epoch, 1, "OLD")));
        assert!(!c.is_connected());
    }

    #[test]
    fn report_from_previous_epoch_is_discarded() {
        let mut c = Connectivity::new();
        let old = c.begin_epoch();
        let new = c.begin_epoch();
        assert_ne!(old, new);
        assert!(!c.apply_report(&ok_report(old, 5, "OLD URL")));
        assert!(!c.is_connected());
        assert!(c.apply_report(&ok_report(new, 1, "NEW URL")));
    }

    #[test]
    fn command_failure_clears_connectivity_immediately() {
        let mut c = Connectivity::new();
        let epoch = c.begin_epoch();
        c.apply_report(&ok_report(epoch, 1, "OK"));
        c.command_failed();
        assert!(!c.is_connected());
        // The next good poll restores it.
        c.apply_report(&ok_report(epoch, 2, "OK"));
        assert!(c.is_connected());
    }

    #[test]
    fn command_success_updates_message_only() {
        let mut c = Connectivity::new();
        c.begin_epoch();
        c.command_succeeded("ACK move");
        assert!(!c.is_connected());
        assert_eq!(c.state().last_received_message, "ACK move");
    }

    #[test]
    fn new_epoch_resets_state() {
        let mut c = Connectivity::new();
        let epoch = c.begin_epoch();
        c.apply_report(&ok_report(epoch, 1, "OK"));
        c.begin_epoch();
        assert!(!c.is_connected());
        assert!(c.state().last_received_message.is_empty());
    }

    // ── PollTask ──────────────────────────────────────────────────────────────

    #[derive(Default)]
    struct CountingLink {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RobotLink for CountingLink {
        async fn health(&self, api_url: &str) -> Result<HealthStatus, DeckError> {
            self.calls.lock().unwrap().push(api_url.to_string());
            Ok(HealthStatus {
                connected: true,
                ..Default::default()
            })
        }

        async fn send(&self, _api_url: &str, _command: &RobotCommand) -> Result<CommandReply, DeckError> {
            Ok(CommandReply::default())
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_immediately_then_every_period() {
        let link = Arc::new(CountingLink::default());
        let (tx, mut rx) = mpsc::channel(16);
        let _task = PollTask::spawn(
            &Handle::current(),
            link.clone(),
            "http://a".into(),
            Duration::from_secs(2),
            1,
            tx,
        );

        settle().await;
        assert_eq!(link.calls.lock().unwrap().len(), 1);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(link.calls.lock().unwrap().len(), 3);

        let mut seqs = Vec::new();
        while let Ok(SessionEvent::Health(report)) = rx.try_recv() {
            assert_eq!(report.epoch, 1);
            seqs.push(report.seq);
        }
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_stops_polling() {
        let link = Arc::new(CountingLink::default());
        let (tx, _rx) = mpsc::channel(16);
        let task = PollTask::spawn(
            &Handle::current(),
            link.clone(),
            "http://a".into(),
            Duration::from_secs(2),
            1,
            tx,
        );
        settle().await;
        task.cancel();

        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(link.calls.lock().unwrap().len(), 1);
    }

    #[derive(Default)]
    struct HangingLink {
        started: Mutex<u32>,
    }

    #[async_trait]
    impl RobotLink for HangingLink {
        async fn health(&self, _api_url: &str) -> Result<HealthStatus, DeckError> {
            *self.started.lock().unwrap() += 1;
            std::future::pending().await
        }

        async fn send(&self, _api_url: &str, _command: &RobotCommand) -> Result<CommandReply, DeckError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_poll_does_not_block_next_tick() {
        let link = Arc::new(HangingLink::default());
        let (tx, _rx) = mpsc::channel(16);
        let _task = PollTask::spawn(
            &Handle::current(),
            link.clone(),
            "http://slow".into(),
            Duration::from_secs(2),
            1,
            tx,
        );
        for _ in 0..3 {
            settle().await;
            tokio::time::advance(Duration::from_secs(2)).await;
        }
        settle().await;
        assert_eq!(*link.started.lock().unwrap(), 4);
    }
}
