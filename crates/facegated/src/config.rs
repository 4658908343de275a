use std::path::PathBuf;
use std::time::Duration;

use crate::rate_limiter::LockoutPolicy;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Euclidean distance below which two descriptors are the same face.
    pub match_threshold: f32,
    pub lockout: LockoutPolicy,
    /// Whether the daemon is running on the session bus (development mode).
    /// UID validation is skipped on the session bus: all callers share the same user.
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("facegate");

        let db_path = std::env::var("FACEGATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("users.db"));

        let defaults = LockoutPolicy::default();

        Self {
            db_path,
            match_threshold: env_f32(
                "FACEGATE_MATCH_THRESHOLD",
                facegate_core::descriptor::DEFAULT_MATCH_THRESHOLD,
            ),
            lockout: LockoutPolicy {
                max_failures: env_u32("FACEGATE_LOCKOUT_MAX_FAILURES", defaults.max_failures),
                window: env_secs("FACEGATE_LOCKOUT_WINDOW_SECS", defaults.window),
                lockout: env_secs("FACEGATE_LOCKOUT_SECS", defaults.lockout),
            },
            session_bus: std::env::var("FACEGATE_SESSION_BUS").is_ok(),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<f32>().ok())
        .filter(|v| v.is_finite() && *v > 0.0)
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
