//! Poll interval as a function of consecutive idle polls.

use std::time::Duration;

/// Suggested sleep after `retries` polls without progress.
#[must_use]
pub fn sleeptime(retries: u32) -> Duration {
    let secs = match retries {
        0..=4 => 1,
        5..=49 => 5,
        50..=499 => 30,
        _ => 60,
    };
    Duration::from_secs(secs)
}
