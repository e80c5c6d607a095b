//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use gone_db::{DEFAULT_MAX_SEGMENT_BYTES, StoreOptions};
use serde::{Deserialize, Serialize};

use crate::scheduler::Schedule;

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Root directory; each ISO week gets its own store below it.
    pub data_dir: PathBuf,
    /// Inactivity after which the user counts as away.
    pub idle_threshold_secs: u64,
    /// How often the X11 watcher samples focus and idle time.
    pub poll_interval_ms: u64,
    /// How often the current target's time is flushed to the store.
    pub flush_interval_secs: u64,
    /// How often the store is compacted.
    pub compact_interval_secs: u64,
    /// How often `report.json` is rewritten.
    pub report_interval_secs: u64,
    /// Segment size before the store starts a new file.
    pub max_segment_bytes: u64,
    /// Whether every store write is synced to disk.
    pub sync_writes: bool,
    /// Drop tracks not seen for this long before compacting. Off when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_hours: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_dir,
            idle_threshold_secs: 5 * 60,
            poll_interval_ms: 1000,
            flush_interval_secs: 30,
            compact_interval_secs: 60 * 60,
            report_interval_secs: 60,
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
            sync_writes: true,
            retention_hours: None,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (GONE_*)
        figment = figment.merge(Env::prefixed("GONE_"));

        figment.extract()
    }

    pub const fn store_options(&self) -> StoreOptions {
        StoreOptions {
            max_segment_bytes: self.max_segment_bytes,
            sync_writes: self.sync_writes,
        }
    }

    /// Values past what chrono can represent saturate, so the user is
    /// never considered idle.
    pub fn idle_threshold(&self) -> chrono::Duration {
        i64::try_from(self.idle_threshold_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn schedule(&self) -> Schedule {
        Schedule {
            flush_every: Duration::from_secs(self.flush_interval_secs.max(1)),
            compact_every: Duration::from_secs(self.compact_interval_secs.max(1)),
            report_every: Duration::from_secs(self.report_interval_secs.max(1)),
            retention: self.retention_hours.map(|hours| {
                i64::try_from(hours)
                    .ok()
                    .and_then(chrono::Duration::try_hours)
                    .unwrap_or(chrono::Duration::MAX)
            }),
        }
    }
}

/// Returns the platform-specific config directory for gone.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("gone"))
}

/// Returns the platform-specific data directory for gone.
///
/// On Linux: `~/.local/share/gone`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("gone"))
}
