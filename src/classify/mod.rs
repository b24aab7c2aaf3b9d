//! Line classification for DAGMan output logs.

mod classifier;
mod event;

pub use classifier::LineClassifier;
pub use event::{ClassifiedEvent, FailureCause, ScriptKind, ScriptOutcome};
