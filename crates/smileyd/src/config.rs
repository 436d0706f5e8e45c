use smiley_core::CameraFacing;
use std::path::PathBuf;
use std::time::Duration;

/// Which D-Bus bus the daemon serves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bus {
    Session,
    System,
}

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Root of the directory-backed media library.
    pub library_dir: PathBuf,
    /// Where captured images land before being filed into the library.
    pub capture_dir: PathBuf,
    /// Latest front-camera frame, written by the camera service.
    pub front_snapshot: PathBuf,
    /// Latest rear-camera frame.
    pub rear_snapshot: PathBuf,
    /// Camera selected at startup.
    pub initial_camera: CameraFacing,
    /// Minimum spacing between delivered detection events.
    pub detection_interval: Duration,
    pub bus: Bus,
}

impl Config {
    /// Load configuration from `SMILEY_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("smiley-cam");

        Self {
            library_dir: env_path("SMILEY_LIBRARY_DIR").unwrap_or_else(|| data_dir.join("library")),
            capture_dir: env_path("SMILEY_CAPTURE_DIR")
                .unwrap_or_else(|| data_dir.join("captures")),
            front_snapshot: env_path("SMILEY_FRONT_SNAPSHOT")
                .unwrap_or_else(|| data_dir.join("front.jpg")),
            rear_snapshot: env_path("SMILEY_REAR_SNAPSHOT")
                .unwrap_or_else(|| data_dir.join("rear.jpg")),
            initial_camera: std::env::var("SMILEY_CAMERA")
                .ok()
                .and_then(|v| parse_camera(&v))
                .unwrap_or_default(),
            detection_interval: Duration::from_millis(env_u64("SMILEY_DETECTION_INTERVAL_MS", 100)),
            bus: std::env::var("SMILEY_BUS")
                .map(|v| parse_bus(&v))
                .unwrap_or(Bus::Session),
        }
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_camera(value: &str) -> Option<CameraFacing> {
    match value.parse() {
        Ok(facing) => Some(facing),
        Err(e) => {
            tracing::warn!(value, error = %e, "ignoring SMILEY_CAMERA");
            None
        }
    }
}

fn parse_bus(value: &str) -> Bus {
    if value.eq_ignore_ascii_case("system") {
        Bus::System
    } else {
        Bus::Session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_camera() {
        assert_eq!(parse_camera("back"), Some(CameraFacing::Back));
        assert_eq!(parse_camera("FRONT"), Some(CameraFacing::Front));
        assert_eq!(parse_camera("sideways"), None);
    }

    #[test]
    fn test_parse_bus() {
        assert_eq!(parse_bus("system"), Bus::System);
        assert_eq!(parse_bus("session"), Bus::Session);
        assert_eq!(parse_bus("anything"), Bus::Session);
    }
}
