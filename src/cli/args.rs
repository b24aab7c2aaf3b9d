//! Command-line arguments and how they override the config file.

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::config::{ConfigError, MonitorConfig};

/// Output log suffix DAGMan writes.
pub const DAGMAN_OUT_SUFFIX: &str = ".dagman.out";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dagman-monitord",
    about = "Tails a DAGMan output log and reports job lifecycle events",
    version
)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Seconds added to every parsed time stamp.
    #[arg(short = 'a', long = "adjust", value_name = "SECS", allow_negative_numbers = true)]
    pub adjust: Option<i64>,

    /// Process a finished log: no waiting, no liveness checks, no notifications.
    #[arg(short, long)]
    pub replay: bool,

    /// Keep workflow bookkeeping when DAGMan restarts.
    #[arg(long)]
    pub keep_state: bool,

    /// Do not follow sub-workflows.
    #[arg(long)]
    pub no_recursive: bool,

    /// Do not write events anywhere.
    #[arg(long)]
    pub no_events: bool,

    /// Event destination file, or `-` for stdout.
    #[arg(short, long, value_name = "PATH")]
    pub dest: Option<String>,

    /// Do not queue notifications.
    #[arg(long)]
    pub no_notifications: bool,

    /// Notifications dispatched per cycle; 0 disables them.
    #[arg(long, value_name = "N")]
    pub notifications_max: Option<usize>,

    /// Jobstate log name, relative to the run directory.
    #[arg(short, long, value_name = "FILE")]
    pub job: Option<PathBuf>,

    /// Directory, relative to the run directory, for the monitor's own files.
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Sleep this many milliseconds between lines.
    #[arg(short = 'S', long, value_name = "MS")]
    pub sim: Option<u64>,

    /// Start even if another monitor holds the pid file.
    #[arg(short, long)]
    pub force: bool,

    /// Config file searched before the default locations.
    #[arg(long, value_name = "PATH")]
    pub conf: Option<PathBuf>,

    /// Append logs to this file instead of stderr.
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// DAGMan output log to track.
    #[arg(value_name = "DAGMAN_OUT")]
    pub dagman_out: PathBuf,
}

impl Cli {
    /// Layer the flags over `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Conflict`] for flags that cannot be combined.
    pub fn apply(&self, mut config: MonitorConfig) -> Result<MonitorConfig, ConfigError> {
        if self.no_events && self.dest.is_some() {
            return Err(ConfigError::Conflict(
                "--no-events cannot be combined with --dest".to_string(),
            ));
        }

        if let Some(adjust) = self.adjust {
            config.adjustment = adjust;
        }
        config.replay |= self.replay;
        config.keep_state |= self.keep_state;
        config.force |= self.force;
        if self.no_recursive {
            config.follow_subworkflows = false;
        }

        if self.no_events {
            config.events.enabled = false;
        }
        if let Some(dest) = &self.dest {
            config.events.dest = Some(dest.clone());
        }
        if self.no_notifications {
            config.notifications.enabled = false;
        }
        if let Some(max) = self.notifications_max {
            config.notifications.max_parallel = max;
        }

        if let Some(job) = &self.job {
            if job.is_absolute() && config.follow_subworkflows {
                tracing::warn!(
                    job = %job.display(),
                    "Absolute jobstate log path, sub-workflows will not be followed"
                );
                config.follow_subworkflows = false;
            }
            config.events.jobstate_log = job.to_string_lossy().into_owned();
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir = Some(dir.clone());
        }
        if let Some(ms) = self.sim {
            config.sim_delay_ms = Some(ms);
        }
        Ok(config)
    }

    /// The output log as an absolute path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOutputLog`] if the name does not end in
    /// `.dagman.out` or the working directory is unknown.
    pub fn output_log(&self) -> Result<PathBuf, ConfigError> {
        absolute_output_log(&self.dagman_out)
    }
}

/// Validate an output log name and anchor it at the working directory.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidOutputLog`] on a bad suffix or an unknown
/// working directory.
pub fn absolute_output_log(path: &Path) -> Result<PathBuf, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidOutputLog {
        path: path.to_path_buf(),
        reason,
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if name.len() <= DAGMAN_OUT_SUFFIX.len() || !name.ends_with(DAGMAN_OUT_SUFFIX) {
        return Err(invalid(format!("name must end in {DAGMAN_OUT_SUFFIX}")));
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .map_err(|e| invalid(e.to_string()))
}
