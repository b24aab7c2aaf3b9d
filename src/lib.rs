//! DAGMan monitor - tails DAGMan output logs and reconstructs job lifecycle events.

pub mod classify;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod events;
pub mod jobs;
pub mod registry;
pub mod scheduler;
pub mod timestamp;
pub mod workflow;
