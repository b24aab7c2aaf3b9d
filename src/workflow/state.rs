//! Per-workflow bookkeeping.

use std::path::PathBuf;

use super::error::WorkflowExit;
use super::subworkflow::ParentLink;

/// Everything the controller knows about one workflow besides its jobs.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    pub run_dir: PathBuf,
    pub dagman_out: PathBuf,
    pub wf_uuid: String,
    pub root_wf_uuid: String,
    pub parent: Option<ParentLink>,

    /// Engine pid, 0 until announced.
    pub dagman_pid: i32,
    pub condor_id: Option<String>,
    pub engine_version: Option<String>,
    pub dag_file: Option<PathBuf>,
    pub common_log: Option<PathBuf>,

    /// Bytes consumed from the output log.
    pub offset: u64,
    /// Lines seen so far, including unparsable ones.
    pub line: u64,
    /// Lines already delivered by a previous daemon.
    pub previous_processed_line: u64,
    pub current_timestamp: i64,

    pub engine_exit: Option<i32>,
    pub daemon_exit: WorkflowExit,
    /// The end event has been produced.
    pub terminated: bool,
    pub restart_count: u32,
    startup_seen: bool,

    /// Inside a DAGMan recovery block.
    pub skipping_recovery_lines: bool,
    /// The next indented line names the common log.
    pub multiline_log_pending: bool,
}

impl WorkflowState {
    #[must_use]
    pub fn new(
        run_dir: PathBuf,
        dagman_out: PathBuf,
        wf_uuid: String,
        root_wf_uuid: String,
        parent: Option<ParentLink>,
    ) -> Self {
        Self {
            run_dir,
            dagman_out,
            wf_uuid,
            root_wf_uuid,
            parent,
            dagman_pid: 0,
            condor_id: None,
            engine_version: None,
            dag_file: None,
            common_log: None,
            offset: 0,
            line: 0,
            previous_processed_line: 0,
            current_timestamp: 0,
            engine_exit: None,
            daemon_exit: WorkflowExit::Normal,
            terminated: false,
            restart_count: 0,
            startup_seen: false,
            skipping_recovery_lines: false,
            multiline_log_pending: false,
        }
    }

    /// Whether the current line was already delivered before a restart.
    #[must_use]
    pub fn replaying_recovered(&self) -> bool {
        self.line <= self.previous_processed_line
    }

    /// Reset engine bookkeeping for a (re)started DAGMan. Jobs are kept.
    pub fn engine_started(&mut self) {
        if self.startup_seen {
            self.restart_count += 1;
            tracing::info!(restart_count = self.restart_count, "DAGMan restarted");
        }
        self.startup_seen = true;
        self.engine_exit = None;
        self.terminated = false;
        self.dagman_pid = 0;
        self.engine_version = None;
    }

    /// Record a workflow-fatal condition, keeping the first one.
    pub fn fail(&mut self, exit: WorkflowExit) {
        if self.daemon_exit == WorkflowExit::Normal {
            self.daemon_exit = exit;
        }
    }
}
