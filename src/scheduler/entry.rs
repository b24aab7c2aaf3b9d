//! One tracked output log and its lifecycle.

use std::path::{Path, PathBuf};

use tokio::time::Instant;

use super::tailer::LogTailer;
use crate::workflow::{Workflow, WorkflowSpec};

/// Where a tracked entry is in its lifecycle.
#[derive(Debug)]
pub enum EntryState {
    /// Output log not seen yet.
    AwaitingFile { spec: WorkflowSpec, retries: u32 },
    /// Output log open and being read.
    Tailing {
        workflow: Box<Workflow>,
        tailer: LogTailer,
        /// File size at the previous poll.
        last_size: u64,
    },
    /// Finished; removed at the end of the cycle.
    Retired,
}

/// A workflow the scheduler polls.
#[derive(Debug)]
pub struct TrackedWorkflow {
    dagman_out: PathBuf,
    pub(crate) state: EntryState,
    /// Consecutive polls without growth.
    pub(crate) stall: u32,
    pub(crate) wake_at: Instant,
}

impl TrackedWorkflow {
    #[must_use]
    pub fn new(spec: WorkflowSpec) -> Self {
        Self {
            dagman_out: spec.dagman_out.clone(),
            state: EntryState::AwaitingFile { spec, retries: 0 },
            stall: 0,
            wake_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn dagman_out(&self) -> &Path {
        &self.dagman_out
    }

    #[must_use]
    pub fn is_retired(&self) -> bool {
        matches!(self.state, EntryState::Retired)
    }

    #[must_use]
    pub fn workflow(&self) -> Option<&Workflow> {
        match &self.state {
            EntryState::Tailing { workflow, .. } => Some(workflow),
            _ => None,
        }
    }

    /// The output log appeared and its workflow was opened.
    pub(crate) fn begin_tailing(&mut self, workflow: Workflow, chunk: usize) {
        let tailer = LogTailer::new(self.dagman_out.clone(), chunk);
        self.state = EntryState::Tailing {
            workflow: Box::new(workflow),
            tailer,
            last_size: 0,
        };
        self.stall = 0;
        self.wake_at = Instant::now();
    }

    /// Leave the live set, returning the workflow if it was open.
    pub(crate) fn retire(&mut self) -> Option<Box<Workflow>> {
        match std::mem::replace(&mut self.state, EntryState::Retired) {
            EntryState::Tailing { workflow, .. } => Some(workflow),
            _ => None,
        }
    }
}
