//! Camera overlay: the status banner and the placeholder detection counters.
//!
//! The object count and fps figures are placeholders until the robot reports
//! real detections.  Their only contract is zero while offline and
//! non-zero while live.

use rand::Rng;
use roverdeck_types::StreamHealth;
use serde::Serialize;

/// Banner drawn over the camera area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CameraBanner {
    ApiDisconnected,
    CameraOffline,
    Live,
}

impl CameraBanner {
    pub fn for_state(api_connected: bool, stream: StreamHealth) -> Self {
        if !api_connected {
            CameraBanner::ApiDisconnected
        } else if !stream.connected {
            CameraBanner::CameraOffline
        } else {
            CameraBanner::Live
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            CameraBanner::ApiDisconnected => "API DISCONNECTED",
            CameraBanner::CameraOffline => "CAMERA OFFLINE",
            CameraBanner::Live => "LIVE",
        }
    }

    pub fn detail(self) -> &'static str {
        match self {
            CameraBanner::ApiDisconnected => "Robot API connection lost",
            CameraBanner::CameraOffline => "Camera stream unavailable",
            CameraBanner::Live => "",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CameraOverlay {
    pub objects: u32,
    pub fps: u32,
}

impl CameraOverlay {
    /// Recompute the counters.  Called once per second.
    pub fn refresh<R: Rng>(&mut self, api_connected: bool, stream: StreamHealth, rng: &mut R) {
        if api_connected && stream.connected {
            self.objects = rng.random_range(6..=10);
            self.fps = if stream.observed_fps > 0 {
                stream.observed_fps
            } else {
                28 + rng.random_range(0..5)
            };
        } else {
            *self = CameraOverlay::default();
        }
    }
}
