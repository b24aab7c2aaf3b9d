//! Per-workflow job table.
//!
//! Reconstructs job attempts from classified log lines, keyed by
//! `(job id, submit sequence)`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::state::JobState;

/// Scheduler-side hints read from a job's submit description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitHints {
    /// Requested walltime in minutes.
    pub walltime_minutes: Option<u64>,
    /// Site the job was planned for.
    pub site: Option<String>,
}

/// Retry bookkeeping announced by DAGMan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryInfo {
    pub attempt: u32,
    pub max: u32,
}

/// One attempt of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub job_id: String,
    pub submit_seq: u32,
    pub state: JobState,
    pub sched_id: Option<String>,
    pub exit_status: Option<i32>,
    pub site: Option<String>,
    /// Requested walltime in seconds.
    pub walltime: Option<u64>,
    pub updated_at: i64,
}

/// Per job id bookkeeping shared by all of its attempts.
#[derive(Debug, Clone, Default)]
struct JobIndex {
    latest_seq: u32,
    site: Option<String>,
    walltime: Option<u64>,
    retry: Option<RetryInfo>,
}

/// An event to apply to the job table.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub job_id: String,
    pub state: JobState,
    pub sched_id: Option<String>,
    pub status: Option<i32>,
    pub timestamp: i64,
    /// Submit description hints, only looked at for `Submit`.
    pub hints: Option<SubmitHints>,
}

impl JobUpdate {
    #[must_use]
    pub fn new(job_id: impl Into<String>, state: JobState, timestamp: i64) -> Self {
        Self {
            job_id: job_id.into(),
            state,
            sched_id: None,
            status: None,
            timestamp,
            hints: None,
        }
    }

    #[must_use]
    pub fn sched_id(mut self, sched_id: impl Into<String>) -> Self {
        self.sched_id = Some(sched_id.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: i32) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn hints(mut self, hints: SubmitHints) -> Self {
        self.hints = Some(hints);
        self
    }
}

/// Outcome of applying a [`JobUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub submit_seq: u32,
    /// Whether the transition is reported downstream. DAGMan's own
    /// submit attempt is bookkeeping only.
    pub emit: bool,
}

/// Job table for one workflow.
#[derive(Debug, Default)]
pub struct JobTracker {
    index: HashMap<String, JobIndex>,
    records: HashMap<(String, u32), JobRecord>,
    last_submitted: Option<String>,
}

impl JobTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an update, allocating a new attempt when the event opens one.
    ///
    /// Returns `None` (after logging) when the job id cannot be resolved to
    /// any attempt, which happens when a completion line precedes its
    /// submit in the log.
    pub fn apply(&mut self, update: JobUpdate) -> Option<Applied> {
        let JobUpdate {
            job_id,
            state,
            sched_id,
            status,
            timestamp,
            hints,
        } = update;

        if state.is_unsubmitted() {
            if let Some(entry) = self.index.get_mut(&job_id) {
                entry.site = None;
                entry.walltime = None;
            }
        }

        if matches!(state, JobState::DagmanSubmit | JobState::Submit) {
            self.last_submitted = Some(job_id.clone());
        }

        let submit_seq = if self.opens_attempt(&job_id, &state) {
            self.allocate(&job_id, timestamp)
        } else if let Some(seq) = self.find_seq(&job_id) {
            seq
        } else {
            tracing::warn!(job_id = %job_id, state = %state, "Cannot find submit sequence for job");
            return None;
        };

        if state == JobState::Submit {
            self.learn_hints(&job_id, hints.unwrap_or_default());
        }

        let (site, walltime) = self
            .index
            .get(&job_id)
            .map(|entry| (entry.site.clone(), entry.walltime))
            .unwrap_or_default();

        let emit = state != JobState::DagmanSubmit;
        if let Some(record) = self.records.get_mut(&(job_id.clone(), submit_seq)) {
            tracing::debug!(
                job_id = %job_id,
                submit_seq,
                from = %record.state,
                to = %state,
                "Job state transition"
            );
            record.state = state;
            if sched_id.is_some() {
                record.sched_id = sched_id;
            }
            if status.is_some() {
                record.exit_status = status;
            }
            record.site = site;
            record.walltime = walltime;
            record.updated_at = timestamp;
        }

        Some(Applied { submit_seq, emit })
    }

    /// Record a DAGMan retry notice. Job attempts are left untouched.
    pub fn note_retry(&mut self, job_id: &str, retry: RetryInfo) {
        self.index.entry(job_id.to_string()).or_default().retry = Some(retry);
    }

    /// The job most recently handed to the scheduler.
    #[must_use]
    pub fn last_submitted(&self) -> Option<&str> {
        self.last_submitted.as_deref()
    }

    /// Latest submit sequence for a job id.
    #[must_use]
    pub fn find_seq(&self, job_id: &str) -> Option<u32> {
        self.index
            .get(job_id)
            .map(|entry| entry.latest_seq)
            .filter(|seq| *seq > 0)
    }

    #[must_use]
    pub fn record(&self, job_id: &str, submit_seq: u32) -> Option<&JobRecord> {
        self.records.get(&(job_id.to_string(), submit_seq))
    }

    /// Latest attempt for a job id.
    #[must_use]
    pub fn latest(&self, job_id: &str) -> Option<&JobRecord> {
        self.find_seq(job_id)
            .and_then(|seq| self.record(job_id, seq))
    }

    #[must_use]
    pub fn site(&self, job_id: &str) -> Option<&str> {
        self.index.get(job_id)?.site.as_deref()
    }

    #[must_use]
    pub fn walltime(&self, job_id: &str) -> Option<u64> {
        self.index.get(job_id)?.walltime
    }

    #[must_use]
    pub fn retry(&self, job_id: &str) -> Option<RetryInfo> {
        self.index.get(job_id)?.retry
    }

    /// Number of job attempts seen.
    #[must_use]
    pub fn attempt_count(&self) -> usize {
        self.records.len()
    }

    /// Job ids whose latest attempt has not reached a final state.
    #[must_use]
    pub fn unfinished(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .index
            .keys()
            .filter(|id| self.latest(id).is_some_and(|r| !r.state.is_terminal()))
            .map(String::as_str)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// A pre-script start always opens a new attempt. Submit-class events
    /// open one unless an earlier event already opened this attempt.
    fn opens_attempt(&self, job_id: &str, state: &JobState) -> bool {
        let latest = self.latest(job_id).map(|r| &r.state);
        match state {
            JobState::PreScriptStarted => true,
            JobState::DagmanSubmit => !matches!(
                latest,
                Some(
                    JobState::PreScriptStarted
                        | JobState::PreScriptTerminated
                        | JobState::PreScriptSuccess
                )
            ),
            JobState::Submit => !matches!(
                latest,
                Some(
                    JobState::PreScriptStarted
                        | JobState::PreScriptTerminated
                        | JobState::PreScriptSuccess
                        | JobState::DagmanSubmit
                )
            ),
            _ => false,
        }
    }

    fn allocate(&mut self, job_id: &str, timestamp: i64) -> u32 {
        let entry = self.index.entry(job_id.to_string()).or_default();
        entry.latest_seq += 1;
        let submit_seq = entry.latest_seq;
        self.records.insert(
            (job_id.to_string(), submit_seq),
            JobRecord {
                job_id: job_id.to_string(),
                submit_seq,
                state: JobState::UnReady,
                sched_id: None,
                exit_status: None,
                site: None,
                walltime: None,
                updated_at: timestamp,
            },
        );
        tracing::debug!(job_id = %job_id, submit_seq, "New job attempt");
        submit_seq
    }

    fn learn_hints(&mut self, job_id: &str, hints: SubmitHints) {
        let entry = self.index.entry(job_id.to_string()).or_default();

        match hints.walltime_minutes {
            Some(minutes) => {
                let seconds = minutes.saturating_mul(60);
                tracing::info!(job_id = %job_id, seconds, "Job requests walltime");
                entry.walltime = Some(seconds);
            }
            None => tracing::info!(job_id = %job_id, "Job does not request a walltime"),
        }

        match hints.site.filter(|site| site != "!!SITE!!") {
            Some(site) => {
                tracing::info!(job_id = %job_id, site = %site, "Job is planned for site");
                entry.site = Some(site);
            }
            None => tracing::info!(job_id = %job_id, "Job has no site information"),
        }
    }
}
