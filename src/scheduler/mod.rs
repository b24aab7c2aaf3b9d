//! The tailing loop: polling, reading and retiring output logs.

mod backoff;
mod entry;
mod error;
#[allow(clippy::module_inception)]
mod scheduler;
mod tailer;

pub use backoff::sleeptime;
pub use entry::{EntryState, TrackedWorkflow};
pub use error::TailError;
pub use scheduler::{RunReport, Scheduler};
pub use tailer::LogTailer;
