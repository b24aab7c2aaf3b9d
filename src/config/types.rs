//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds added to every resolved timestamp.
    pub adjustment: i64,
    /// Re-read a finished log instead of following a live one.
    pub replay: bool,
    /// Keep workflow bookkeeping when DAGMan restarts.
    pub keep_state: bool,
    /// Track sub-workflows spawned by the DAG.
    pub follow_subworkflows: bool,
    /// Directory (relative to the run directory) for daemon files.
    pub output_dir: Option<PathBuf>,
    /// Delay between lines in milliseconds.
    pub sim_delay_ms: Option<u64>,
    /// Start even if the pid file names a live daemon.
    pub force: bool,
    pub tailing: TailingConfig,
    pub events: EventsConfig,
    pub notifications: NotificationsConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            adjustment: 0,
            replay: false,
            keep_state: false,
            follow_subworkflows: true,
            output_dir: None,
            sim_delay_ms: None,
            force: false,
            tailing: TailingConfig::default(),
            events: EventsConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Whether notifications are dispatched at all. Replay never notifies.
    #[must_use]
    pub fn notifications_enabled(&self) -> bool {
        self.notifications.enabled && self.notifications.max_parallel > 0 && !self.replay
    }
}

/// Polling limits for the tailing loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TailingConfig {
    /// Bytes read per workflow per cycle.
    pub read_chunk_bytes: usize,
    /// Longest sleep between cycles.
    pub max_sleep_secs: u64,
    /// Cycles to wait for an output log to appear.
    pub appearance_retries: u32,
    /// Stalled cycles before the engine process is probed.
    pub liveness_after: u32,
    /// Stalled cycles after which a workflow is abandoned.
    pub stall_limit: u32,
    /// Idle cycles after which a replayed workflow is considered done.
    pub replay_idle_limit: u32,
}

impl Default for TailingConfig {
    fn default() -> Self {
        Self {
            read_chunk_bytes: 32 * 1024,
            max_sleep_secs: 10,
            appearance_retries: 100,
            liveness_after: 10,
            stall_limit: 17_280,
            replay_idle_limit: 5,
        }
    }
}

/// Event output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EventsConfig {
    pub enabled: bool,
    /// File to append events to, `-` for stdout. Defaults to a file next
    /// to the output log.
    pub dest: Option<String>,
    /// Jobstate log name, relative to the run directory.
    pub jobstate_log: String,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dest: None,
            jobstate_log: "jobstate.log".to_string(),
        }
    }
}

/// Notification dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationsConfig {
    pub enabled: bool,
    /// Notifications dispatched per loop cycle.
    pub max_parallel: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_parallel: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tailing_defaults() {
        let config = TailingConfig::default();
        assert_eq!(config.read_chunk_bytes, 32768);
        assert_eq!(config.max_sleep_secs, 10);
        assert_eq!(config.appearance_retries, 100);
        assert_eq!(config.liveness_after, 10);
        assert_eq!(config.stall_limit, 17280);
        assert_eq!(config.replay_idle_limit, 5);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"
            adjustment = -3600

            [tailing]
            stall_limit = 50

            [events]
            dest = "-"
        "#;
        let config: MonitorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.adjustment, -3600);
        assert_eq!(config.tailing.stall_limit, 50);
        assert_eq!(config.tailing.read_chunk_bytes, 32768);
        assert_eq!(config.events.dest.as_deref(), Some("-"));
        assert!(config.events.enabled);
        assert!(config.follow_subworkflows);
    }

    #[test]
    fn test_replay_disables_notifications() {
        let mut config = MonitorConfig::default();
        assert!(config.notifications_enabled());
        config.replay = true;
        assert!(!config.notifications_enabled());
        config.replay = false;
        config.notifications.max_parallel = 0;
        assert!(!config.notifications_enabled());
    }
}
