//! Command-line surface of the daemon.

mod args;

pub use args::*;
