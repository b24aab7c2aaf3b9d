//! Job lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// State of one job attempt as reported in the output log.
///
/// ULOG event names map onto their own variants; states DAGMan never
/// reports through ULOG (script outcomes, final job verdicts) are
/// synthesized from its plain-text lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum JobState {
    UnReady,
    PreScriptStarted,
    PreScriptTerminated,
    PreScriptSuccess,
    PreScriptFailure,
    /// DAGMan is about to hand the job to the scheduler.
    DagmanSubmit,
    Submit,
    SubmitFailed,
    Execute,
    ExecutableError,
    JobEvicted,
    JobTerminated,
    ImageSize,
    ShadowException,
    JobAborted,
    JobSuspended,
    JobUnsuspended,
    JobHeld,
    JobReleased,
    GridSubmit,
    GlobusSubmit,
    PostScriptStarted,
    PostScriptTerminated,
    PostScriptSuccess,
    PostScriptFailure,
    JobSuccess,
    JobFailure,
    /// Any ULOG event without a dedicated variant.
    Other(String),
}

impl JobState {
    /// Map a ULOG event name (the part after `ULOG_`) to a state.
    #[must_use]
    pub fn from_ulog(name: &str) -> Self {
        match name {
            "SUBMIT" => Self::Submit,
            "EXECUTE" => Self::Execute,
            "EXECUTABLE_ERROR" => Self::ExecutableError,
            "JOB_EVICTED" => Self::JobEvicted,
            "JOB_TERMINATED" => Self::JobTerminated,
            "IMAGE_SIZE" => Self::ImageSize,
            "SHADOW_EXCEPTION" => Self::ShadowException,
            "JOB_ABORTED" => Self::JobAborted,
            "JOB_SUSPENDED" => Self::JobSuspended,
            "JOB_UNSUSPENDED" => Self::JobUnsuspended,
            "JOB_HELD" => Self::JobHeld,
            "JOB_RELEASED" => Self::JobReleased,
            "GRID_SUBMIT" => Self::GridSubmit,
            "GLOBUS_SUBMIT" => Self::GlobusSubmit,
            "POST_SCRIPT_TERMINATED" => Self::PostScriptTerminated,
            other => Self::from_name(other),
        }
    }

    /// Canonical upper-case name, as written to the jobstate log.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::UnReady => "UN_READY",
            Self::PreScriptStarted => "PRE_SCRIPT_STARTED",
            Self::PreScriptTerminated => "PRE_SCRIPT_TERMINATED",
            Self::PreScriptSuccess => "PRE_SCRIPT_SUCCESS",
            Self::PreScriptFailure => "PRE_SCRIPT_FAILURE",
            Self::DagmanSubmit => "DAGMAN_SUBMIT",
            Self::Submit => "SUBMIT",
            Self::SubmitFailed => "SUBMIT_FAILED",
            Self::Execute => "EXECUTE",
            Self::ExecutableError => "EXECUTABLE_ERROR",
            Self::JobEvicted => "JOB_EVICTED",
            Self::JobTerminated => "JOB_TERMINATED",
            Self::ImageSize => "IMAGE_SIZE",
            Self::ShadowException => "SHADOW_EXCEPTION",
            Self::JobAborted => "JOB_ABORTED",
            Self::JobSuspended => "JOB_SUSPENDED",
            Self::JobUnsuspended => "JOB_UNSUSPENDED",
            Self::JobHeld => "JOB_HELD",
            Self::JobReleased => "JOB_RELEASED",
            Self::GridSubmit => "GRID_SUBMIT",
            Self::GlobusSubmit => "GLOBUS_SUBMIT",
            Self::PostScriptStarted => "POST_SCRIPT_STARTED",
            Self::PostScriptTerminated => "POST_SCRIPT_TERMINATED",
            Self::PostScriptSuccess => "POST_SCRIPT_SUCCESS",
            Self::PostScriptFailure => "POST_SCRIPT_FAILURE",
            Self::JobSuccess => "JOB_SUCCESS",
            Self::JobFailure => "JOB_FAILURE",
            Self::Other(name) => name,
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "UN_READY" => Self::UnReady,
            "PRE_SCRIPT_STARTED" => Self::PreScriptStarted,
            "PRE_SCRIPT_TERMINATED" => Self::PreScriptTerminated,
            "PRE_SCRIPT_SUCCESS" => Self::PreScriptSuccess,
            "PRE_SCRIPT_FAILURE" => Self::PreScriptFailure,
            "DAGMAN_SUBMIT" => Self::DagmanSubmit,
            "SUBMIT_FAILED" => Self::SubmitFailed,
            "POST_SCRIPT_STARTED" => Self::PostScriptStarted,
            "POST_SCRIPT_SUCCESS" => Self::PostScriptSuccess,
            "POST_SCRIPT_FAILURE" => Self::PostScriptFailure,
            "JOB_SUCCESS" => Self::JobSuccess,
            "JOB_FAILURE" => Self::JobFailure,
            other => Self::Other(other.to_string()),
        }
    }

    /// States that mean the job went back to "not yet submitted", which
    /// invalidates any site or walltime learned from an earlier plan.
    #[must_use]
    pub fn is_unsubmitted(&self) -> bool {
        matches!(
            self,
            Self::UnReady | Self::PreScriptStarted | Self::PreScriptSuccess | Self::PreScriptFailure
        )
    }

    /// States after which the attempt accepts no more events; another
    /// submit-class event for the job opens a new attempt.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::JobSuccess
                | Self::JobFailure
                | Self::SubmitFailed
                | Self::PreScriptFailure
                | Self::PostScriptSuccess
                | Self::PostScriptFailure
        )
    }

    /// Coarse lifecycle phase of this state.
    #[must_use]
    pub fn phase(&self) -> JobPhase {
        match self {
            Self::UnReady => JobPhase::Unsubmitted,
            Self::PreScriptStarted
            | Self::PreScriptTerminated
            | Self::PreScriptSuccess
            | Self::PreScriptFailure => JobPhase::PreScript,
            Self::DagmanSubmit | Self::SubmitFailed => JobPhase::SubmitAttempted,
            Self::Submit | Self::GridSubmit | Self::GlobusSubmit => JobPhase::Submitted,
            Self::PostScriptStarted
            | Self::PostScriptTerminated
            | Self::PostScriptSuccess
            | Self::PostScriptFailure => JobPhase::PostScript,
            Self::JobSuccess => JobPhase::Succeeded,
            Self::JobFailure => JobPhase::Failed,
            _ => JobPhase::Executing,
        }
    }
}

/// Coarse phase of a job attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Unsubmitted,
    PreScript,
    SubmitAttempted,
    Submitted,
    Executing,
    Succeeded,
    Failed,
    PostScript,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        state.as_str().to_string()
    }
}

impl From<String> for JobState {
    fn from(name: String) -> Self {
        Self::from_ulog(&name)
    }
}
