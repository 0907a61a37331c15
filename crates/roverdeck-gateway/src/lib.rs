//! `roverdeck-gateway` – HTTP plumbing to the robot
//!
//! Everything that crosses the network lives here; the session crate only
//! sees the [`RobotLink`] and [`FrameSource`] traits.
//!
//! # Modules
//!
//! - [`link`] – the [`RobotLink`] / [`FrameSource`] trait seam.
//! - [`gateway`] – [`CommandGateway`]: `GET /healthz` and JSON `POST`s to the
//!   robot control API.
//! - [`probe`] – [`Prober`]: timeout-bounded reachability checks for
//!   candidate API and camera URLs.
//! - [`frames`] – [`HttpFrameSource`] for still images and MJPEG streams,
//!   plus the cache-busting URL helper.

pub mod frames;
pub mod gateway;
pub mod link;
pub mod probe;

#[cfg(test)]
pub(crate) mod test_server;

pub use frames::{HttpFrameSource, MultipartSplitter, cache_busted, multipart_boundary};
pub use gateway::CommandGateway;
pub use link::{FrameSource, RobotLink};
pub use probe::{PROBE_TIMEOUT, Prober};
