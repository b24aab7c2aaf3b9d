//! Normalized events produced for each accepted state transition.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::jobs::{JobState, RetryInfo};

/// What an event reports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EventKind {
    WorkflowStarted,
    WorkflowEnded,
    /// A job attempt moved to a new state.
    Job(JobState),
    /// DAGMan announced a retry of a node.
    JobRetry,
    /// A parent job was linked to an already tracked sub-workflow.
    SubworkflowMapped,
}

impl EventKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::WorkflowStarted => "WORKFLOW_STARTED",
            Self::WorkflowEnded => "WORKFLOW_ENDED",
            Self::Job(state) => state.as_str(),
            Self::JobRetry => "JOB_RETRY",
            Self::SubworkflowMapped => "SUBWF_MAP",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl From<String> for EventKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "WORKFLOW_STARTED" => Self::WorkflowStarted,
            "WORKFLOW_ENDED" => Self::WorkflowEnded,
            "JOB_RETRY" => Self::JobRetry,
            "SUBWF_MAP" => Self::SubworkflowMapped,
            _ => Self::Job(JobState::from(raw)),
        }
    }
}

/// One normalized event record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorEvent {
    pub wf_uuid: String,
    pub root_wf_uuid: String,
    pub kind: EventKind,
    /// Epoch seconds, already adjusted.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_seq: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sched_id: Option<String>,
    /// Job exit status, or the workflow exit code on `WorkflowEnded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    /// Requested walltime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub walltime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subwf_uuid: Option<String>,
    /// Set on the start event of a sub-workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_wf_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryInfo>,
}

impl MonitorEvent {
    /// Event with only the workflow identity filled in.
    #[must_use]
    pub fn new(
        wf_uuid: impl Into<String>,
        root_wf_uuid: impl Into<String>,
        kind: EventKind,
        timestamp: i64,
    ) -> Self {
        Self {
            wf_uuid: wf_uuid.into(),
            root_wf_uuid: root_wf_uuid.into(),
            kind,
            timestamp,
            job_id: None,
            submit_seq: None,
            sched_id: None,
            status: None,
            site: None,
            walltime: None,
            restart_count: None,
            subwf_uuid: None,
            parent_wf_uuid: None,
            retry: None,
        }
    }

    #[must_use]
    pub fn job(mut self, job_id: impl Into<String>, submit_seq: u32) -> Self {
        self.job_id = Some(job_id.into());
        self.submit_seq = Some(submit_seq);
        self
    }

    #[must_use]
    pub fn status(mut self, status: Option<i32>) -> Self {
        self.status = status;
        self
    }

    /// The job state carried by a job event.
    #[must_use]
    pub fn job_state(&self) -> Option<&JobState> {
        match &self.kind {
            EventKind::Job(state) => Some(state),
            _ => None,
        }
    }
}
