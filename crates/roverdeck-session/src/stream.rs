//! Camera stream watching.
//!
//! The camera URL is opened with a cache-busting query parameter and every
//! frame it yields is counted: one per request for a still image, one per
//! part for an MJPEG stream.  When the source ends cleanly it is reopened.
//! A [`StreamSubscription`] owns that loop and reports every outcome as a
//! [`SessionEvent`] tagged with its generation; the [`StreamWatcher`] turns
//! those outcomes into [`StreamHealth`].
//!
//! Re-subscribing always disposes the previous subscription first, and
//! events carrying an older generation are ignored, so frames of an old
//! subscription can never be counted towards the new one's frame rate.

use std::sync::Arc;
use std::time::Duration;

use roverdeck_gateway::{FrameSource, cache_busted};
use roverdeck_types::StreamHealth;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::events::SessionEvent;

/// Pause before reopening a camera source that ended cleanly.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(100);

const FRAME_BUFFER: usize = 4;

const FPS_WINDOW: Duration = Duration::from_secs(1);

// ─────────────────────────────────────────────────────────────────────────────
// FpsCounter
// ─────────────────────────────────────────────────────────────────────────────

/// Rolling one-second frame counter.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    frames: u32,
    window_start: Instant,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            frames: 0,
            window_start: now,
        }
    }

    /// Count one frame.  Once at least a second has passed since the window
    /// opened, returns `round(frames * 1000 / elapsed_ms)` and opens a new
    /// window.
    pub fn record_frame(&mut self, now: Instant) -> Option<u32> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < FPS_WINDOW {
            return None;
        }
        let elapsed_ms = elapsed.as_millis() as f64;
        let fps = (f64::from(self.frames) * 1000.0 / elapsed_ms).round() as u32;
        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StreamSubscription
// ─────────────────────────────────────────────────────────────────────────────

/// A running frame-fetch loop.  Disposing (or dropping) it aborts the loop.
pub struct StreamSubscription {
    generation: u64,
    handle: JoinHandle<()>,
}

impl StreamSubscription {
    /// Start watching `camera_url` on `runtime`.
    ///
    /// The loop opens a freshly cache-busted URL and reports
    /// [`SessionEvent::FrameLoaded`] for every frame.  When the source ends
    /// it waits `frame_interval` and opens it again.  The first failure
    /// reports [`SessionEvent::FrameFailed`] and ends the loop; a new
    /// subscription is needed to try again.
    pub fn spawn(
        runtime: &Handle,
        source: Arc<dyn FrameSource>,
        camera_url: String,
        frame_interval: Duration,
        generation: u64,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let handle = runtime.spawn(async move {
            loop {
                let url = cache_busted(&camera_url);
                let (frame_tx, mut frame_rx) = mpsc::channel(FRAME_BUFFER);
                let events_ref = &events;
                let forward = async move {
                    while frame_rx.recv().await.is_some() {
                        if events_ref.send(SessionEvent::FrameLoaded { generation }).await.is_err() {
                            return false;
                        }
                    }
                    true
                };
                let (result, listening) = tokio::join!(source.stream_frames(&url, frame_tx), forward);
                if !listening {
                    break;
                }
                match result {
                    Ok(()) => tokio::time::sleep(frame_interval).await,
                    Err(error) => {
                        warn!(%camera_url, error = %error, "camera frame failed");
                        let _ = events.send(SessionEvent::FrameFailed { generation, error }).await;
                        break;
                    }
                }
            }
        });
        Self { generation, handle }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop the fetch loop.
    pub fn dispose(self) {}
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StreamWatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Owner of [`StreamHealth`] and the current camera subscription.
pub struct StreamWatcher {
    runtime: Handle,
    source: Arc<dyn FrameSource>,
    frame_interval: Duration,
    health: StreamHealth,
    fps: FpsCounter,
    generation: u64,
    subscription: Option<StreamSubscription>,
}

impl StreamWatcher {
    /// Subscriptions are spawned on `runtime`, so reconfiguring works from
    /// any thread.
    pub fn new(runtime: Handle, source: Arc<dyn FrameSource>, frame_interval: Duration) -> Self {
        Self {
            runtime,
            source,
            frame_interval,
            health: StreamHealth::default(),
            fps: FpsCounter::new(Instant::now()),
            generation: 0,
            subscription: None,
        }
    }

    pub fn health(&self) -> StreamHealth {
        self.health
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Tear down the current subscription and, when `api_connected` is set
    /// and `camera_url` is non-empty, attach a fresh one.
    ///
    /// Health reads as disconnected with zero fps until the new
    /// subscription's first frame arrives.
    pub fn reconfigure(&mut self, camera_url: &str, api_connected: bool, events: &mpsc::Sender<SessionEvent>) {
        self.dispose();
        self.health = StreamHealth::default();

        if camera_url.is_empty() || !api_connected {
            debug!(%camera_url, api_connected, "camera stream idle");
            return;
        }

        self.generation += 1;
        self.fps = FpsCounter::new(Instant::now());
        info!(%camera_url, generation = self.generation, "camera stream attached");
        self.subscription = Some(StreamSubscription::spawn(
            &self.runtime,
            Arc::clone(&self.source),
            camera_url.to_string(),
            self.frame_interval,
            self.generation,
            events.clone(),
        ));
    }

    /// Frame loaded.  Returns `false` if the event was for a stale
    /// subscription.
    pub fn on_frame(&mut self, generation: u64, now: Instant) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.health.connected = true;
        if let Some(fps) = self.fps.record_frame(now) {
            self.health.observed_fps = fps;
        }
        true
    }

    /// Frame failed.  Returns `false` if the event was for a stale
    /// subscription.
    pub fn on_error(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.health = StreamHealth::default();
        true
    }

    /// Drop the subscription, if any.
    pub fn dispose(&mut self) {
        if let Some(sub) = self.subscription.take() {
            debug!(generation = sub.generation(), "camera stream detached");
            sub.dispose();
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.subscription.is_some() && generation == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use roverdeck_types::DeckError;
    use std::sync::Mutex;

    #[test]
    fn fps_reported_once_per_window() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(start);
        for i in 1..25 {
            assert_eq!(counter.record_frame(start + Duration::from_millis(40 * i)), None);
        }
        // 25th frame lands exactly on the one-second mark.
        assert_eq!(counter.record_frame(start + Duration::from_millis(1000)), Some(25));
        // Fresh window afterwards.
        assert_eq!(counter.record_frame(start + Duration::from_millis(1040)), None);
    }

    #[test]
    fn fps_rounds_over_long_window() {
        let start = Instant::now();
        let mut counter = FpsCounter::new(start);
        counter.record_frame(start + Duration::from_millis(500));
        counter.record_frame(start + Duration::from_millis(900));
        // 3 frames over 1.5 s → 2 fps.
        assert_eq!(counter.record_frame(start + Duration::from_millis(1500)), Some(2));
    }

    struct ScriptedSource {
        fail_after: usize,
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn stream_frames(&self, url: &str, frames: mpsc::Sender<usize>) -> Result<(), DeckError> {
            let opened = {
                let mut urls = self.urls.lock().unwrap();
                urls.push(url.to_string());
                urls.len()
            };
            if opened > self.fail_after {
                return Err(DeckError::Network("camera gone".into()));
            }
            let _ = frames.send(1024).await;
            Ok(())
        }
    }

    fn watcher(fail_after: usize) -> (Arc<ScriptedSource>, StreamWatcher) {
        let source = Arc::new(ScriptedSource {
            fail_after,
            urls: Mutex::new(Vec::new()),
        });
        let watcher = StreamWatcher::new(Handle::current(), source.clone(), Duration::from_millis(100));
        (source, watcher)
    }

    #[tokio::test]
    async fn no_subscription_without_api_or_url() {
        let (_source, mut w) = watcher(usize::MAX);
        let (tx, _rx) = mpsc::channel(8);
        w.reconfigure("http://cam/stream", false, &tx);
        assert!(!w.is_subscribed());
        w.reconfigure("", true, &tx);
        assert!(!w.is_subscribed());
        assert_eq!(w.health(), StreamHealth::default());
    }

    #[tokio::test(start_paused = true)]
    async fn frames_mark_connected_and_error_resets() {
        let (source, mut w) = watcher(3);
        let (tx, mut rx) = mpsc::channel(8);
        w.reconfigure("http://cam/stream", true, &tx);

        for _ in 0..3 {
            match rx.recv().await.unwrap() {
                SessionEvent::FrameLoaded { generation } => assert!(w.on_frame(generation, Instant::now())),
                other => panic!("unexpected {other:?}"),
            }
            assert!(w.health().connected);
        }

        match rx.recv().await.unwrap() {
            SessionEvent::FrameFailed { generation, .. } => assert!(w.on_error(generation)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(w.health(), StreamHealth { connected: false, observed_fps: 0 });

        let urls = source.urls.lock().unwrap();
        assert!(urls.iter().all(|u| u.starts_with("http://cam/stream?t=")));
    }

    #[tokio::test]
    async fn stale_generation_is_ignored() {
        let (_source, mut w) = watcher(usize::MAX);
        let (tx, _rx) = mpsc::channel(8);
        w.reconfigure("http://cam/a", true, &tx);
        let old = w.generation();
        w.reconfigure("http://cam/b", true, &tx);

        assert!(!w.on_frame(old, Instant::now()));
        assert!(!w.health().connected);
        assert!(!w.on_error(old));
        assert!(w.on_frame(w.generation(), Instant::now()));
        assert!(w.health().connected);
    }

    #[tokio::test]
    async fn losing_api_detaches_and_zeroes_health() {
        let (_source, mut w) = watcher(usize::MAX);
        let (tx, _rx) = mpsc::channel(8);
        w.reconfigure("http://cam", true, &tx);
        let generation = w.generation();
        w.on_frame(generation, Instant::now());
        assert!(w.health().connected);

        w.reconfigure("http://cam", false, &tx);
        assert!(!w.is_subscribed());
        assert_eq!(w.health(), StreamHealth::default());
        assert!(!w.on_frame(generation, Instant::now()));
    }
}
