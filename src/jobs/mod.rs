//! Job lifecycle tracking.

mod state;
mod tracker;

pub use state::{JobPhase, JobState};
pub use tracker::{Applied, JobRecord, JobTracker, JobUpdate, RetryInfo, SubmitHints};
