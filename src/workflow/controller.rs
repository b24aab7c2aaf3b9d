//! One workflow's lifecycle, driven line by line.

use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use super::error::{WorkflowError, WorkflowExit};
use super::files::{DagDescription, WorkflowFiles};
use super::recovery::{RecoveryMarker, RECOVERY_FILE};
use super::state::WorkflowState;
use super::subworkflow::{resolve_output, sub_dag_for, ParentLink, SubworkflowSpawn};
use super::symlink::{link_common_log, out2log};
use crate::classify::{ClassifiedEvent, LineClassifier, ScriptKind, ScriptOutcome};
use crate::config::MonitorConfig;
use crate::events::{EventKind, JobstateLog, MonitorEvent};
use crate::jobs::{JobState, JobTracker, JobUpdate, RetryInfo, SubmitHints};
use crate::registry::SubworkflowRegistry;
use crate::timestamp::TimestampResolver;

/// Directory holding the daemon's own files for a run directory.
#[must_use]
pub fn daemon_dir(run_dir: &Path, output_dir: Option<&Path>) -> PathBuf {
    output_dir.map_or_else(|| run_dir.to_path_buf(), |dir| run_dir.join(dir))
}

/// Behaviour switches shared by every workflow of a daemon run.
#[derive(Debug, Clone, Default)]
pub struct WorkflowOptions {
    pub replay: bool,
    pub keep_state: bool,
    pub follow_subworkflows: bool,
    pub output_dir: Option<PathBuf>,
    /// Jobstate log name; `None` disables it.
    pub jobstate_log: Option<String>,
}

impl WorkflowOptions {
    #[must_use]
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            replay: config.replay,
            keep_state: config.keep_state,
            follow_subworkflows: config.follow_subworkflows,
            output_dir: config.output_dir.clone(),
            jobstate_log: Some(config.events.jobstate_log.clone()),
        }
    }
}

/// What to track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowSpec {
    pub dagman_out: PathBuf,
    pub root_wf_uuid: Option<String>,
    pub parent: Option<ParentLink>,
}

impl WorkflowSpec {
    #[must_use]
    pub fn root(dagman_out: impl Into<PathBuf>) -> Self {
        Self {
            dagman_out: dagman_out.into(),
            root_wf_uuid: None,
            parent: None,
        }
    }
}

impl From<SubworkflowSpawn> for WorkflowSpec {
    fn from(spawn: SubworkflowSpawn) -> Self {
        Self {
            dagman_out: spawn.dagman_out,
            root_wf_uuid: Some(spawn.root_wf_uuid),
            parent: Some(spawn.parent),
        }
    }
}

/// Shared collaborators lent to a workflow for one line.
pub struct LineContext<'a> {
    pub classifier: &'a LineClassifier,
    pub resolver: &'a TimestampResolver,
    pub files: &'a dyn WorkflowFiles,
    pub registry: &'a mut SubworkflowRegistry,
}

/// Final report for a retired workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowSummary {
    pub dagman_out: PathBuf,
    pub wf_uuid: Option<String>,
    pub engine_exit: Option<i32>,
    pub exit: WorkflowExit,
    pub lines: u64,
}

/// Controller for one tracked workflow.
#[derive(Debug)]
pub struct Workflow {
    state: WorkflowState,
    jobs: JobTracker,
    dag: DagDescription,
    options: WorkflowOptions,
    outbox: Vec<MonitorEvent>,
    jobstate: Option<JobstateLog>,
    recovery_path: PathBuf,
    /// Set when the workflow must be retired right away.
    abort: Option<WorkflowExit>,
}

impl Workflow {
    /// Set up bookkeeping for the output log named by `spec`.
    ///
    /// # Errors
    ///
    /// Returns an error if the output log has no parent directory or an
    /// existing recovery marker cannot be read.
    pub fn open(
        spec: WorkflowSpec,
        files: &dyn WorkflowFiles,
        options: WorkflowOptions,
    ) -> Result<Self, WorkflowError> {
        let run_dir = spec
            .dagman_out
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| WorkflowError::NoRunDir(spec.dagman_out.clone()))?
            .to_path_buf();

        let dump = files.braindump(&run_dir).unwrap_or_default();
        let wf_uuid = dump.wf_uuid.unwrap_or_else(|| {
            let generated = Uuid::new_v4().to_string();
            tracing::warn!(
                run_dir = %run_dir.display(),
                wf_uuid = %generated,
                "No wf_uuid in braindump, generated one"
            );
            generated
        });
        let root_wf_uuid = spec
            .root_wf_uuid
            .or(dump.root_wf_uuid)
            .unwrap_or_else(|| wf_uuid.clone());

        let mut state = WorkflowState::new(
            run_dir.clone(),
            spec.dagman_out,
            wf_uuid,
            root_wf_uuid,
            spec.parent,
        );

        let recovery_path =
            daemon_dir(&run_dir, options.output_dir.as_deref()).join(RECOVERY_FILE);
        if let Some(marker) = RecoveryMarker::load(&recovery_path)? {
            tracing::info!(
                run_dir = %run_dir.display(),
                last_processed_line = marker.last_processed_line,
                "Entering recovery, already delivered lines will be replayed silently"
            );
            state.previous_processed_line = marker.last_processed_line;
        }

        let jobstate = options.jobstate_log.as_ref().and_then(|name| {
            let path = run_dir.join(name);
            JobstateLog::open(&path)
                .map_err(|e| {
                    tracing::warn!(path = %path.display(), error = %e, "Unable to open jobstate log");
                })
                .ok()
        });

        tracing::info!(
            dagman_out = %state.dagman_out.display(),
            wf_uuid = %state.wf_uuid,
            "Tracking workflow"
        );

        Ok(Self {
            state,
            jobs: JobTracker::new(),
            dag: DagDescription::default(),
            options,
            outbox: Vec::new(),
            jobstate,
            recovery_path,
            abort: None,
        })
    }

    #[must_use]
    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    #[must_use]
    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    #[must_use]
    pub fn wf_uuid(&self) -> &str {
        &self.state.wf_uuid
    }

    /// Condition that requires retiring the workflow immediately.
    #[must_use]
    pub fn aborted(&self) -> Option<WorkflowExit> {
        self.abort
    }

    /// Record how far the output log has been read.
    pub fn set_offset(&mut self, offset: u64) {
        self.state.offset = offset;
    }

    /// Events produced since the last call, in log order.
    pub fn take_events(&mut self) -> Vec<MonitorEvent> {
        std::mem::take(&mut self.outbox)
    }

    /// Process one complete line (without its newline).
    ///
    /// Returns a sub-workflow to start tracking when the line submitted one.
    pub fn process_line(
        &mut self,
        line: &str,
        ctx: &mut LineContext<'_>,
    ) -> Option<SubworkflowSpawn> {
        self.state.line += 1;

        let Some(timestamp) = ctx.resolver.resolve(line) else {
            tracing::info!(line = self.state.line, "Time stamp format not recognized");
            return None;
        };
        self.state.current_timestamp = timestamp;

        if self.state.skipping_recovery_lines {
            if ctx.classifier.classify(line, false) == Some(ClassifiedEvent::RecoveryExited) {
                tracing::info!(line = self.state.line, "Leaving DAGMan recovery mode");
                self.state.skipping_recovery_lines = false;
            }
            return None;
        }

        let event = ctx
            .classifier
            .classify(line, self.state.multiline_log_pending)?;
        self.dispatch(event, timestamp, ctx)
    }

    /// Link a parent job to a sub-workflow that is already tracked.
    pub fn map_subworkflow(&mut self, parent: &ParentLink, subwf_uuid: Option<&str>) {
        let Some(subwf_uuid) = subwf_uuid else {
            tracing::warn!(
                job_id = %parent.job_id,
                submit_seq = parent.submit_seq,
                "Sub-workflow already tracked but its wf_uuid is unknown"
            );
            return;
        };
        let mut event = self
            .event(EventKind::SubworkflowMapped, self.state.current_timestamp)
            .job(&parent.job_id, parent.submit_seq);
        event.subwf_uuid = Some(subwf_uuid.to_string());
        let silent = self.state.replaying_recovered();
        self.emit(event, silent);
    }

    /// Persist the recovery marker. Call only after this workflow's events
    /// have been flushed to the sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn checkpoint(&mut self) -> Result<(), WorkflowError> {
        if let Some(log) = self.jobstate.as_mut() {
            if let Err(e) = log.flush() {
                tracing::warn!(error = %e, "Unable to flush jobstate log");
            }
        }
        let line = self.state.line.max(self.state.previous_processed_line);
        RecoveryMarker::new(line, self.state.offset).save(&self.recovery_path)
    }

    /// Retire the workflow: produce the end event if DAGMan never did,
    /// and drop the recovery marker after a clean finish.
    pub fn finish(&mut self, exit: WorkflowExit) -> WorkflowSummary {
        if exit != WorkflowExit::Normal {
            self.state.fail(exit);
        }
        if let Some(abort) = self.abort {
            self.state.fail(abort);
        }

        let timestamp = if self.state.current_timestamp == 0 {
            chrono::Utc::now().timestamp()
        } else {
            self.state.current_timestamp
        };
        self.end_workflow(timestamp, false);

        if let Some(log) = self.jobstate.as_mut() {
            if let Err(e) = log.flush() {
                tracing::warn!(error = %e, "Unable to flush jobstate log");
            }
        }

        if self.state.engine_exit.is_some() && self.state.daemon_exit == WorkflowExit::Normal {
            if let Err(e) = RecoveryMarker::remove(&self.recovery_path) {
                tracing::warn!(error = %e, "Unable to remove recovery marker");
            }
        }

        let unfinished = self.jobs.unfinished();
        if !unfinished.is_empty() {
            tracing::info!(count = unfinished.len(), "Jobs without a final state at retirement");
        }
        tracing::info!(
            dagman_out = %self.state.dagman_out.display(),
            engine_exit = ?self.state.engine_exit,
            exit = self.state.daemon_exit.code(),
            lines = self.state.line,
            "Workflow retired"
        );

        WorkflowSummary {
            dagman_out: self.state.dagman_out.clone(),
            wf_uuid: Some(self.state.wf_uuid.clone()),
            engine_exit: self.state.engine_exit,
            exit: self.state.daemon_exit,
            lines: self.state.line,
        }
    }

    fn dispatch(
        &mut self,
        event: ClassifiedEvent,
        ts: i64,
        ctx: &mut LineContext<'_>,
    ) -> Option<SubworkflowSpawn> {
        let silent = self.state.replaying_recovered();
        match event {
            ClassifiedEvent::JobEvent {
                kind,
                job_id,
                sched_id,
                ..
            } => {
                let state = JobState::from_ulog(&kind);
                let submitted = state == JobState::Submit;
                let mut update = JobUpdate::new(&job_id, state, ts).sched_id(sched_id);
                if submitted {
                    update = update.hints(self.submit_hints(&job_id, ctx.files));
                }
                let submit_seq = self.apply_job(update, silent)?;
                if submitted && self.options.follow_subworkflows {
                    return self.discover_subworkflow(&job_id, submit_seq, ctx);
                }
            }
            ClassifiedEvent::JobSubmitted { job_id } => {
                self.apply_job(JobUpdate::new(job_id, JobState::DagmanSubmit, ts), silent);
            }
            ClassifiedEvent::SubmitError => {
                if let Some(job_id) = self.jobs.last_submitted().map(str::to_string) {
                    self.apply_job(JobUpdate::new(job_id, JobState::SubmitFailed, ts), silent);
                } else {
                    tracing::warn!("Submit error in output log, but no job was submitted yet");
                }
            }
            ClassifiedEvent::ScriptStarted { script, job_id } => {
                let state = match script {
                    ScriptKind::Pre => JobState::PreScriptStarted,
                    ScriptKind::Post => JobState::PostScriptStarted,
                };
                self.apply_job(JobUpdate::new(job_id, state, ts), silent);
            }
            ClassifiedEvent::ScriptTerminated {
                script,
                job_id,
                outcome,
            } => self.script_terminated(script, &job_id, outcome, ts, silent),
            ClassifiedEvent::JobFailed {
                job_id,
                sched_id,
                code,
                ..
            } => {
                let update = JobUpdate::new(job_id, JobState::JobFailure, ts)
                    .sched_id(sched_id)
                    .status(code);
                self.apply_job(update, silent);
            }
            ClassifiedEvent::JobSucceeded { job_id, sched_id } => {
                let update = JobUpdate::new(job_id, JobState::JobSuccess, ts)
                    .sched_id(sched_id)
                    .status(0);
                self.apply_job(update, silent);
            }
            ClassifiedEvent::Retry {
                job_id,
                attempt,
                max,
            } => {
                let retry = RetryInfo { attempt, max };
                self.jobs.note_retry(&job_id, retry);
                tracing::info!(job_id = %job_id, attempt, max, "DAGMan retries node");
                let mut event = self.event(EventKind::JobRetry, ts);
                event.submit_seq = self.jobs.find_seq(&job_id);
                event.job_id = Some(job_id);
                event.retry = Some(retry);
                self.emit(event, silent);
            }
            ClassifiedEvent::EngineFinished { exit_code } => {
                if let Some(code) = exit_code {
                    self.state.engine_exit = Some(code);
                } else {
                    tracing::warn!("Cannot convert DAGMan's exit code to integer");
                    self.state.engine_exit = Some(0);
                    self.state.fail(WorkflowExit::Fatal);
                }
                tracing::info!(exit_code = ?self.state.engine_exit, "DAGMan finished");
                self.end_workflow(ts, silent);
            }
            ClassifiedEvent::EngineStartup { condor_id } => {
                tracing::debug!(condor_id = %condor_id, "DAGMan starting");
                self.state.condor_id = Some(condor_id);
                if !self.options.keep_state {
                    self.state.engine_started();
                }
            }
            ClassifiedEvent::EnginePid { pid } => {
                if !self.options.replay {
                    if let Some(pid) = pid {
                        tracing::info!(pid, "DAGMan runs at pid");
                        self.state.dagman_pid = pid;
                    } else {
                        tracing::error!("Cannot set DAGMan pid");
                        self.abort = Some(WorkflowExit::EngineGone);
                    }
                }
            }
            ClassifiedEvent::DagNameParsed { dag } => {
                let dag_file = self.state.run_dir.join(dag);
                tracing::info!(dag = %dag_file.display(), "Using DAG");
                if let Some(description) = ctx.files.dag(&dag_file) {
                    tracing::info!(jobs = description.job_count(), "Read DAG");
                    self.dag = description;
                }
                self.state.dag_file = Some(dag_file);
                self.start_workflow(ts, silent);
            }
            ClassifiedEvent::EngineVersion { version, .. } => {
                tracing::info!(version = %version, "Using DAGMan version");
                self.state.engine_version = Some(version);
            }
            ClassifiedEvent::CommonLogLocation { path } => {
                let target = PathBuf::from(path);
                tracing::info!(path = %target.display(), "Condor writes its log file");
                if !silent {
                    let link = out2log(&self.state.run_dir, &self.state.dagman_out);
                    link_common_log(&link, &target);
                }
                self.state.common_log = Some(target);
                self.state.multiline_log_pending = false;
            }
            ClassifiedEvent::MultilineLogMarker => {
                self.state.multiline_log_pending = true;
            }
            ClassifiedEvent::RecoveryEntered => {
                tracing::info!(line = self.state.line, "Skipping DAGMan recovery block");
                self.state.skipping_recovery_lines = true;
            }
            ClassifiedEvent::RecoveryExited => {}
            ClassifiedEvent::EngineAborted => {
                tracing::warn!(run_dir = %self.state.run_dir.display(), "DAGMan was aborted");
            }
        }
        None
    }

    fn script_terminated(
        &mut self,
        script: ScriptKind,
        job_id: &str,
        outcome: ScriptOutcome,
        ts: i64,
        silent: bool,
    ) {
        // DAGMan has no ULOG event for the end of a PRE script.
        if script == ScriptKind::Pre {
            self.apply_job(JobUpdate::new(job_id, JobState::PreScriptTerminated, ts), silent);
        }
        let update = match (script, outcome) {
            (ScriptKind::Pre, ScriptOutcome::Success) => {
                JobUpdate::new(job_id, JobState::PreScriptSuccess, ts).status(0)
            }
            (ScriptKind::Post, ScriptOutcome::Success) => {
                JobUpdate::new(job_id, JobState::PostScriptSuccess, ts).status(0)
            }
            (ScriptKind::Pre, ScriptOutcome::Failure { code }) => {
                JobUpdate::new(job_id, JobState::PreScriptFailure, ts).status(code)
            }
            (ScriptKind::Post, ScriptOutcome::Failure { code }) => {
                JobUpdate::new(job_id, JobState::PostScriptFailure, ts).status(code)
            }
            (_, ScriptOutcome::Unknown) => {
                tracing::warn!(job_id = %job_id, script = %script, "Unknown script state");
                return;
            }
        };
        self.apply_job(update, silent);
    }

    fn apply_job(&mut self, update: JobUpdate, silent: bool) -> Option<u32> {
        let job_id = update.job_id.clone();
        let state = update.state.clone();
        let status = update.status;
        let timestamp = update.timestamp;

        let applied = self.jobs.apply(update)?;
        if applied.emit {
            let mut event = self
                .event(EventKind::Job(state), timestamp)
                .job(&job_id, applied.submit_seq)
                .status(status);
            if let Some(record) = self.jobs.record(&job_id, applied.submit_seq) {
                event.sched_id.clone_from(&record.sched_id);
                event.site.clone_from(&record.site);
                event.walltime = record.walltime;
            }
            self.emit(event, silent);
        }
        Some(applied.submit_seq)
    }

    fn submit_hints(&self, job_id: &str, files: &dyn WorkflowFiles) -> SubmitHints {
        let submit_file = self
            .dag
            .jobs
            .get(job_id)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(format!("{job_id}.sub")));
        files
            .submit(&self.state.run_dir.join(submit_file))
            .map(|desc| SubmitHints {
                walltime_minutes: desc.walltime_minutes,
                site: desc.site,
            })
            .unwrap_or_default()
    }

    fn discover_subworkflow(
        &mut self,
        job_id: &str,
        submit_seq: u32,
        ctx: &mut LineContext<'_>,
    ) -> Option<SubworkflowSpawn> {
        let sub_dag = sub_dag_for(&self.state.run_dir, &self.dag, job_id, ctx.files)?;
        match resolve_output(&sub_dag, ctx.files, ctx.registry) {
            Ok(dagman_out) => Some(SubworkflowSpawn {
                dagman_out,
                root_wf_uuid: self.state.root_wf_uuid.clone(),
                parent: ParentLink {
                    wf_uuid: self.state.wf_uuid.clone(),
                    job_id: job_id.to_string(),
                    submit_seq,
                },
            }),
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Unable to register sub-workflow");
                None
            }
        }
    }

    fn start_workflow(&mut self, ts: i64, silent: bool) {
        let mut event = self.event(EventKind::WorkflowStarted, ts);
        event.restart_count = Some(self.state.restart_count);
        event.parent_wf_uuid = self.state.parent.as_ref().map(|p| p.wf_uuid.clone());
        self.emit(event, silent);
    }

    fn end_workflow(&mut self, ts: i64, silent: bool) {
        if self.state.terminated {
            return;
        }
        self.state.terminated = true;
        let status = self
            .state
            .engine_exit
            .unwrap_or_else(|| self.state.daemon_exit.code());
        let event = self.event(EventKind::WorkflowEnded, ts).status(Some(status));
        self.emit(event, silent);
    }

    fn event(&self, kind: EventKind, ts: i64) -> MonitorEvent {
        MonitorEvent::new(&self.state.wf_uuid, &self.state.root_wf_uuid, kind, ts)
    }

    fn emit(&mut self, event: MonitorEvent, silent: bool) {
        if silent {
            tracing::trace!(kind = %event.kind, "Suppressed already delivered event");
            return;
        }
        if let Some(log) = self.jobstate.as_mut() {
            if let Err(e) = log.record(&event) {
                tracing::warn!(error = %e, "Unable to write jobstate log");
            }
        }
        self.outbox.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::files::FsWorkflowFiles;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        classifier: LineClassifier,
        resolver: TimestampResolver,
        files: FsWorkflowFiles,
        registry: SubworkflowRegistry,
    }

    impl Harness {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::write(dir.path().join("braindump.txt"), "wf_uuid wf-1\n").unwrap();
            std::fs::write(dir.path().join("test.dag"), "JOB A a.sub\nJOB B b.sub\n").unwrap();
            Self {
                dir,
                classifier: LineClassifier::new().unwrap(),
                resolver: TimestampResolver::new(0).unwrap(),
                files: FsWorkflowFiles::new().unwrap(),
                registry: SubworkflowRegistry::open_in_memory().unwrap(),
            }
        }

        fn workflow(&self) -> Workflow {
            let options = WorkflowOptions {
                follow_subworkflows: true,
                ..WorkflowOptions::default()
            };
            Workflow::open(
                WorkflowSpec::root(self.dir.path().join("test.dag.dagman.out")),
                &self.files,
                options,
            )
            .unwrap()
        }

        fn feed(&mut self, workflow: &mut Workflow, lines: &[&str]) -> Vec<SubworkflowSpawn> {
            let mut ctx = LineContext {
                classifier: &self.classifier,
                resolver: &self.resolver,
                files: &self.files,
                registry: &mut self.registry,
            };
            lines
                .iter()
                .filter_map(|line| workflow.process_line(line, &mut ctx))
                .collect()
        }
    }

    fn kinds(events: &[MonitorEvent]) -> Vec<String> {
        events.iter().map(|e| e.kind.to_string()).collect()
    }

    #[test]
    fn test_uuid_comes_from_braindump() {
        let harness = Harness::new();
        let workflow = harness.workflow();
        assert_eq!(workflow.wf_uuid(), "wf-1");
        assert_eq!(workflow.state().root_wf_uuid, "wf-1");
    }

    #[test]
    fn test_lines_without_timestamp_only_count() {
        let mut harness = Harness::new();
        let mut workflow = harness.workflow();
        harness.feed(&mut workflow, &["", "garbage without time"]);
        assert_eq!(workflow.state().line, 2);
        assert!(workflow.take_events().is_empty());
    }

    #[test]
    fn test_pre_script_success_emits_terminated_then_success() {
        let mut harness = Harness::new();
        let mut workflow = harness.workflow();
        harness.feed(
            &mut workflow,
            &[
                "03/05/24 10:20:30 Running PRE script of Node A...",
                "03/05/24 10:20:31 PRE Script of Node A completed successfully.",
            ],
        );
        let events = workflow.take_events();
        assert_eq!(
            kinds(&events),
            vec!["PRE_SCRIPT_STARTED", "PRE_SCRIPT_TERMINATED", "PRE_SCRIPT_SUCCESS"]
        );
        assert!(events.iter().all(|e| e.submit_seq == Some(1)));
        assert_eq!(events[2].status, Some(0));
    }

    #[test]
    fn test_engine_exit_ends_workflow_once() {
        let mut harness = Harness::new();
        let mut workflow = harness.workflow();
        harness.feed(
            &mut workflow,
            &["03/05/24 10:20:30 **** condor_scheduniv_exec.9.0 (condor_DAGMAN) pid 1 EXITING WITH STATUS 3"],
        );
        let summary = workflow.finish(WorkflowExit::Normal);
        let events = workflow.take_events();
        assert_eq!(kinds(&events), vec!["WORKFLOW_ENDED"]);
        assert_eq!(events[0].status, Some(3));
        assert_eq!(summary.engine_exit, Some(3));
        assert_eq!(summary.exit, WorkflowExit::Normal);
    }

    #[test]
    fn test_restart_is_counted_on_next_start_event() {
        let mut harness = Harness::new();
        let mut workflow = harness.workflow();
        harness.feed(
            &mut workflow,
            &[
                "03/05/24 10:20:30 ** condor_scheduniv_exec.9.0 (CONDOR_DAGMAN) STARTING UP",
                "03/05/24 10:20:30 Parsing test.dag ...",
                "03/05/24 10:30:30 ** condor_scheduniv_exec.10.0 (CONDOR_DAGMAN) STARTING UP",
                "03/05/24 10:30:30 Parsing test.dag ...",
            ],
        );
        let events = workflow.take_events();
        assert_eq!(events[0].restart_count, Some(0));
        assert_eq!(events[1].restart_count, Some(1));
        assert_eq!(workflow.state().condor_id.as_deref(), Some("10.0"));
    }

    #[test]
    fn test_pid_ignored_in_replay() {
        let harness = Harness::new();
        let mut workflow = Workflow::open(
            WorkflowSpec::root(harness.dir.path().join("test.dag.dagman.out")),
            &harness.files,
            WorkflowOptions {
                replay: true,
                ..WorkflowOptions::default()
            },
        )
        .unwrap();
        let mut harness = harness;
        harness.feed(&mut workflow, &["03/05/24 10:20:30 ** PID = 4242"]);
        assert_eq!(workflow.state().dagman_pid, 0);
    }

    #[test]
    fn test_submit_error_without_submit_is_dropped() {
        let mut harness = Harness::new();
        let mut workflow = harness.workflow();
        harness.feed(&mut workflow, &["03/05/24 10:20:31 ERROR: submit attempt failed"]);
        assert!(workflow.take_events().is_empty());
    }

    #[test]
    fn test_subworkflow_spawn_links_parent() {
        let mut harness = Harness::new();
        std::fs::write(
            harness.dir.path().join("test.dag"),
            "SUBDAG EXTERNAL B inner/b.dag\n",
        )
        .unwrap();
        let mut workflow = harness.workflow();
        let spawns = harness.feed(
            &mut workflow,
            &[
                "03/05/24 10:20:30 Parsing test.dag ...",
                "03/05/24 10:20:31 Event: ULOG_SUBMIT for Condor Node B (77.0.0)",
            ],
        );
        assert_eq!(spawns.len(), 1);
        let spawn = &spawns[0];
        assert_eq!(
            spawn.dagman_out,
            harness.dir.path().join("inner").join("b.dag.dagman.out")
        );
        assert_eq!(spawn.parent.job_id, "B");
        assert_eq!(spawn.parent.submit_seq, 1);
        assert_eq!(spawn.root_wf_uuid, "wf-1");

        workflow.map_subworkflow(&spawn.parent, Some("sub-1"));
        let events = workflow.take_events();
        let mapped = events.last().unwrap();
        assert_eq!(mapped.kind, EventKind::SubworkflowMapped);
        assert_eq!(mapped.subwf_uuid.as_deref(), Some("sub-1"));
    }

    #[test]
    fn test_jobstate_log_written() {
        let harness = Harness::new();
        let mut workflow = Workflow::open(
            WorkflowSpec::root(harness.dir.path().join("test.dag.dagman.out")),
            &harness.files,
            WorkflowOptions {
                jobstate_log: Some("jobstate.log".to_string()),
                ..WorkflowOptions::default()
            },
        )
        .unwrap();
        let mut harness = harness;
        harness.feed(
            &mut workflow,
            &["03/05/24 10:20:31 Event: ULOG_SUBMIT for Condor Node A (77.0.0)"],
        );
        workflow.checkpoint().unwrap();
        let content =
            std::fs::read_to_string(harness.dir.path().join("jobstate.log")).unwrap();
        assert!(content.contains(" A SUBMIT 77.0 - - 1"));
        assert!(harness.dir.path().join(RECOVERY_FILE).exists());
    }

    #[test]
    fn test_clean_finish_removes_marker() {
        let mut harness = Harness::new();
        let mut workflow = harness.workflow();
        harness.feed(
            &mut workflow,
            &["03/05/24 10:20:30 **** condor_scheduniv_exec.9.0 (condor_DAGMAN) pid 1 EXITING WITH STATUS 0"],
        );
        workflow.checkpoint().unwrap();
        assert!(harness.dir.path().join(RECOVERY_FILE).exists());
        workflow.finish(WorkflowExit::Normal);
        assert!(!harness.dir.path().join(RECOVERY_FILE).exists());
    }
}
