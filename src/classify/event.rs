//! Classified log line events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which of a node's scripts a line refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScriptKind {
    Pre,
    Post,
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pre => f.write_str("PRE"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// How a script run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOutcome {
    Success,
    Failure { code: i32 },
    /// The line named neither outcome.
    Unknown,
}

/// Why a job proc failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    Status,
    Signal,
}

/// The single event a log line was classified as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedEvent {
    /// `Event: ULOG_<kind> for Condor Node <job> (<sched id>[.<sub id>])`
    JobEvent {
        kind: String,
        job_id: String,
        sched_id: String,
        sub_id: Option<String>,
    },
    /// `Submitting Condor Node <job> job(s)...`
    JobSubmitted { job_id: String },
    /// `ERROR: submit attempt failed`, attributed to the last submitted job.
    SubmitError,
    ScriptStarted { script: ScriptKind, job_id: String },
    ScriptTerminated {
        script: ScriptKind,
        job_id: String,
        outcome: ScriptOutcome,
    },
    JobFailed {
        job_id: String,
        sched_id: String,
        cause: FailureCause,
        code: i32,
    },
    JobSucceeded { job_id: String, sched_id: String },
    Retry { job_id: String, attempt: u32, max: u32 },
    /// DAGMan's own exit line. `None` when the code did not parse.
    EngineFinished { exit_code: Option<i32> },
    /// DAGMan start-up banner carrying its scheduler id.
    EngineStartup { condor_id: String },
    /// `None` when the pid did not parse.
    EnginePid { pid: Option<i32> },
    EngineVersion { version: String, major: String },
    DagNameParsed { dag: String },
    /// Location of the shared job log, from either log format.
    CommonLogLocation { path: String },
    /// Start of the multi-line user log list; the next indented line is the path.
    MultilineLogMarker,
    RecoveryEntered,
    RecoveryExited,
    EngineAborted,
}
