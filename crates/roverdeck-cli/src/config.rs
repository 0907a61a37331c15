//! Operator config – reads/writes `~/.roverdeck/config.toml`.

use roverdeck_session::SessionConfig;
use roverdeck_types::{DEFAULT_API_URL, DEFAULT_CAMERA_URL, DEFAULT_MOVE_SPEED, EndpointConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted operator configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the robot control API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Camera stream URL.  Empty disables the camera.
    #[serde(default = "default_camera_url")]
    pub camera_url: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Deadline for the settings reachability probes.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    #[serde(default = "default_move_speed")]
    pub move_speed: u16,

    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}
fn default_camera_url() -> String {
    DEFAULT_CAMERA_URL.to_string()
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_probe_timeout_ms() -> u64 {
    3000
}
fn default_move_speed() -> u16 {
    DEFAULT_MOVE_SPEED
}
fn default_frame_interval_ms() -> u64 {
    100
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            camera_url: default_camera_url(),
            poll_interval_ms: default_poll_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            move_speed: default_move_speed(),
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

impl Config {
    pub fn endpoints(&self) -> EndpointConfig {
        EndpointConfig {
            api_url: self.api_url.clone(),
            camera_url: self.camera_url.clone(),
        }
    }

    pub fn set_endpoints(&mut self, endpoints: EndpointConfig) {
        self.api_url = endpoints.api_url;
        self.camera_url = endpoints.camera_url;
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Session tunables.  Zero intervals fall back to one millisecond so a
    /// bad config can't spin the poll or frame loops.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            endpoints: self.endpoints(),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            frame_interval: Duration::from_millis(self.frame_interval_ms.max(1)),
            move_speed: self.move_speed,
        }
    }
}

/// Return the path to `~/.roverdeck/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".roverdeck").join("config.toml")
}

/// Load the config from disk with environment overrides applied.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `ROVERDECK_*` environment overrides.
///
/// | Variable | Config field |
/// |---|---|
/// | `ROVERDECK_API_URL` | `api_url` |
/// | `ROVERDECK_CAMERA_URL` | `camera_url` |
/// | `ROVERDECK_POLL_INTERVAL_MS` | `poll_interval_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("ROVERDECK_API_URL") {
        cfg.api_url = v;
    }
    if let Ok(v) = std::env::var("ROVERDECK_CAMERA_URL") {
        cfg.camera_url = v;
    }
    if let Ok(v) = std::env::var("ROVERDECK_POLL_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.poll_interval_ms = ms;
    }
}

/// Save the config, creating `~/.roverdeck/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
