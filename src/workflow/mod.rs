//! Workflow controller and its run directory bookkeeping.

mod controller;
mod error;
mod files;
mod recovery;
mod state;
mod subworkflow;
mod symlink;

pub use controller::{
    daemon_dir, LineContext, Workflow, WorkflowOptions, WorkflowSpec, WorkflowSummary,
};
pub use error::{WorkflowError, WorkflowExit};
pub use files::{
    parse_braindump, parse_dag, Braindump, DagDescription, FsWorkflowFiles, SubmitDescription,
    WorkflowFiles,
};
pub use recovery::{RecoveryMarker, RECOVERY_FILE};
pub use state::WorkflowState;
pub use subworkflow::{ParentLink, SubworkflowSpawn};
pub use symlink::{link_common_log, out2log, LinkOutcome};
