//! Cooperative polling loop over every tracked workflow.
//!
//! One cycle visits each due entry in turn: waits for its output log to
//! appear, reads what was appended, feeds the lines through its workflow
//! and delivers the resulting events before the recovery marker moves.
//! Entries retired during a cycle are dropped at its end and sub-workflows
//! discovered during it join the set.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::Instant;

use super::backoff::sleeptime;
use super::entry::{EntryState, TrackedWorkflow};
use super::tailer::LogTailer;
use crate::classify::LineClassifier;
use crate::config::{MonitorConfig, TailingConfig};
use crate::daemon::{default_probe, DaemonContext, DaemonError, ProcessProbe};
use crate::events::{
    EventSink, LoggingDispatcher, MonitorEvent, NotificationDispatcher, NotificationQueue,
    SinkError,
};
use crate::registry::SubworkflowRegistry;
use crate::timestamp::TimestampResolver;
use crate::workflow::{
    FsWorkflowFiles, LineContext, SubworkflowSpawn, Workflow, WorkflowExit, WorkflowFiles,
    WorkflowOptions, WorkflowSpec, WorkflowSummary,
};

/// Outcome of a whole daemon run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub summaries: Vec<WorkflowSummary>,
    /// A termination signal cut the run short.
    pub interrupted: bool,
}

impl RunReport {
    /// Process exit code: 1 after a termination signal, else 0.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(self.interrupted)
    }
}

/// Collaborators every line passes through.
struct Pipeline {
    classifier: LineClassifier,
    resolver: TimestampResolver,
    files: Box<dyn WorkflowFiles>,
    registry: SubworkflowRegistry,
}

impl Pipeline {
    fn context(&mut self) -> LineContext<'_> {
        LineContext {
            classifier: &self.classifier,
            resolver: &self.resolver,
            files: self.files.as_ref(),
            registry: &mut self.registry,
        }
    }
}

/// Where events go once a workflow produced them.
struct Delivery {
    sink: Box<dyn EventSink>,
    notifications: NotificationQueue,
    dispatcher: Box<dyn NotificationDispatcher>,
}

impl Delivery {
    fn deliver(&mut self, events: &[MonitorEvent]) -> Result<(), SinkError> {
        if events.is_empty() {
            return Ok(());
        }
        for event in events {
            self.sink.emit(event)?;
            self.notifications.observe(event);
        }
        self.sink.flush()
    }

    fn service_notifications(&mut self) -> usize {
        self.notifications.service(self.dispatcher.as_mut())
    }
}

/// Output logs known to the scheduler, for de-duplicating spawns.
#[derive(Debug, Default)]
struct Roster {
    live: HashSet<PathBuf>,
    /// Every path ever admitted; consulted only in replay.
    seen: HashSet<PathBuf>,
    uuids: HashMap<PathBuf, String>,
    remember_seen: bool,
}

impl Roster {
    fn admit(&mut self, path: &Path) -> bool {
        if self.live.contains(path) || (self.remember_seen && self.seen.contains(path)) {
            return false;
        }
        self.live.insert(path.to_path_buf());
        if self.remember_seen {
            self.seen.insert(path.to_path_buf());
        }
        true
    }
}

enum Verdict {
    Continue(Duration),
    Retire(WorkflowExit),
}

/// Split borrows of the scheduler for the duration of one cycle.
struct Cycle<'a> {
    pipeline: &'a mut Pipeline,
    delivery: &'a mut Delivery,
    roster: &'a mut Roster,
    finished: &'a mut Vec<WorkflowSummary>,
    probe: &'a dyn ProcessProbe,
    options: &'a WorkflowOptions,
    tailing: &'a TailingConfig,
    sim_delay: Option<Duration>,
    spawned: Vec<WorkflowSpec>,
}

impl Cycle<'_> {
    async fn poll(&mut self, entry: &mut TrackedWorkflow) -> Result<(), SinkError> {
        match entry.state {
            EntryState::Retired => Ok(()),
            EntryState::AwaitingFile { .. } => self.await_file(entry).await,
            EntryState::Tailing { .. } => self.tail(entry).await,
        }
    }

    async fn await_file(&mut self, entry: &mut TrackedWorkflow) -> Result<(), SinkError> {
        let path = entry.dagman_out().to_path_buf();
        match tokio::fs::metadata(&path).await {
            Ok(_) => {
                let EntryState::AwaitingFile { spec, .. } = &entry.state else {
                    return Ok(());
                };
                match Workflow::open(spec.clone(), self.pipeline.files.as_ref(), self.options.clone())
                {
                    Ok(workflow) => {
                        self.roster
                            .uuids
                            .insert(path, workflow.wf_uuid().to_string());
                        entry.begin_tailing(workflow, self.tailing.read_chunk_bytes);
                        Ok(())
                    }
                    Err(e) => {
                        tracing::error!(path = %path.display(), error = %e, "Unable to open workflow");
                        self.retire(entry, WorkflowExit::Fatal)
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.options.replay {
                    tracing::info!(path = %path.display(), "Output log missing in replay, retiring");
                    return self.retire(entry, WorkflowExit::Normal);
                }
                let EntryState::AwaitingFile { retries, .. } = &mut entry.state else {
                    return Ok(());
                };
                *retries += 1;
                let retries = *retries;
                if retries > self.tailing.appearance_retries {
                    tracing::error!(path = %path.display(), retries, "Output log never appeared");
                    return self.retire(entry, WorkflowExit::Fatal);
                }
                tracing::debug!(path = %path.display(), retries, "Waiting for output log");
                entry.wake_at = Instant::now() + sleeptime(retries);
                Ok(())
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Unable to stat output log");
                self.retire(entry, WorkflowExit::Fatal)
            }
        }
    }

    async fn tail(&mut self, entry: &mut TrackedWorkflow) -> Result<(), SinkError> {
        let verdict = {
            let EntryState::Tailing {
                workflow,
                tailer,
                last_size,
            } = &mut entry.state
            else {
                return Ok(());
            };
            self.advance(workflow, tailer, last_size, &mut entry.stall)
                .await?
        };
        match verdict {
            Verdict::Continue(pause) => {
                entry.wake_at = Instant::now() + pause;
                Ok(())
            }
            Verdict::Retire(exit) => self.retire(entry, exit),
        }
    }

    async fn advance(
        &mut self,
        workflow: &mut Workflow,
        tailer: &mut LogTailer,
        last_size: &mut u64,
        stall: &mut u32,
    ) -> Result<Verdict, SinkError> {
        if let Some(exit) = workflow.aborted() {
            return Ok(Verdict::Retire(exit));
        }

        let size = match tailer.size().await {
            Ok(size) => size,
            Err(e) => {
                tracing::error!(path = %tailer.path().display(), error = %e, "Unable to stat output log");
                return Ok(Verdict::Retire(WorkflowExit::Fatal));
            }
        };
        if size < *last_size {
            tracing::error!(
                path = %tailer.path().display(),
                previous = *last_size,
                size,
                "Output log was truncated"
            );
            return Ok(Verdict::Retire(WorkflowExit::Fatal));
        }
        if size == *last_size && tailer.offset() >= size {
            *stall += 1;
            return Ok(self.idle_verdict(workflow, *stall));
        }
        *last_size = size;
        *stall = 0;

        let lines = match tailer.read_lines().await {
            Ok(Some(lines)) => lines,
            Ok(None) => return Ok(Verdict::Continue(sleeptime(0))),
            Err(e) => {
                tracing::error!(path = %tailer.path().display(), error = %e, "Unable to read output log");
                return Ok(Verdict::Retire(WorkflowExit::EngineGone));
            }
        };

        for line in &lines {
            let spawn = workflow.process_line(line, &mut self.pipeline.context());
            if let Some(spawn) = spawn {
                self.admit_spawn(workflow, spawn);
            }
            if let Some(delay) = self.sim_delay {
                tokio::time::sleep(delay).await;
            }
        }
        workflow.set_offset(tailer.offset());
        self.delivery.deliver(&workflow.take_events())?;
        if let Err(e) = workflow.checkpoint() {
            tracing::warn!(error = %e, "Unable to write recovery marker");
        }

        if let Some(exit) = workflow.aborted() {
            return Ok(Verdict::Retire(exit));
        }
        if tailer.offset() < size || self.options.replay {
            Ok(Verdict::Continue(Duration::ZERO))
        } else {
            Ok(Verdict::Continue(sleeptime(0)))
        }
    }

    fn idle_verdict(&self, workflow: &Workflow, stall: u32) -> Verdict {
        let state = workflow.state();
        let path = state.dagman_out.display();

        if self.options.replay {
            if stall > self.tailing.replay_idle_limit {
                tracing::info!(path = %path, "Output log exhausted in replay, retiring");
                return Verdict::Retire(WorkflowExit::Normal);
            }
            return Verdict::Continue(Duration::ZERO);
        }
        if state.engine_exit.is_some() {
            tracing::info!(path = %path, "DAGMan finished and output log is complete");
            return Verdict::Retire(WorkflowExit::Normal);
        }
        if stall > self.tailing.stall_limit {
            tracing::error!(path = %path, stall, "Output log stalled for too long");
            return Verdict::Retire(WorkflowExit::Fatal);
        }
        if stall > self.tailing.liveness_after
            && state.dagman_pid > 0
            && !self.probe.is_alive(state.dagman_pid)
        {
            tracing::error!(path = %path, pid = state.dagman_pid, "DAGMan process is gone");
            return Verdict::Retire(WorkflowExit::EngineGone);
        }
        Verdict::Continue(sleeptime(stall))
    }

    fn admit_spawn(&mut self, workflow: &mut Workflow, spawn: SubworkflowSpawn) {
        if self.roster.admit(&spawn.dagman_out) {
            tracing::info!(
                path = %spawn.dagman_out.display(),
                job_id = %spawn.parent.job_id,
                "Tracking sub-workflow"
            );
            self.spawned.push(WorkflowSpec::from(spawn));
            return;
        }
        tracing::debug!(path = %spawn.dagman_out.display(), "Sub-workflow already tracked");
        let uuid = self.roster.uuids.get(&spawn.dagman_out).map(String::as_str);
        workflow.map_subworkflow(&spawn.parent, uuid);
    }

    fn retire(&mut self, entry: &mut TrackedWorkflow, exit: WorkflowExit) -> Result<(), SinkError> {
        self.roster.live.remove(entry.dagman_out());
        retire_entry(entry, exit, self.delivery, self.finished)
    }
}

/// Finish whatever `entry` holds and record its summary.
fn retire_entry(
    entry: &mut TrackedWorkflow,
    exit: WorkflowExit,
    delivery: &mut Delivery,
    finished: &mut Vec<WorkflowSummary>,
) -> Result<(), SinkError> {
    if entry.is_retired() {
        return Ok(());
    }
    match entry.retire() {
        Some(mut workflow) => {
            finished.push(workflow.finish(exit));
            delivery.deliver(&workflow.take_events())
        }
        None => {
            tracing::info!(path = %entry.dagman_out().display(), exit = exit.code(), "Retired before the output log was opened");
            finished.push(WorkflowSummary {
                dagman_out: entry.dagman_out().to_path_buf(),
                wf_uuid: None,
                engine_exit: None,
                exit,
                lines: 0,
            });
            Ok(())
        }
    }
}

/// The tailing loop and everything it owns.
pub struct Scheduler {
    options: WorkflowOptions,
    tailing: TailingConfig,
    sim_delay: Option<Duration>,
    pipeline: Pipeline,
    delivery: Delivery,
    probe: Box<dyn ProcessProbe>,
    roster: Roster,
    entries: Vec<TrackedWorkflow>,
    finished: Vec<WorkflowSummary>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tracked", &self.entries.len())
            .field("finished", &self.finished.len())
            .field("replay", &self.options.replay)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Build a scheduler with filesystem collaborators and the platform probe.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in pattern fails to compile.
    pub fn new(
        config: &MonitorConfig,
        registry: SubworkflowRegistry,
        sink: Box<dyn EventSink>,
    ) -> Result<Self, regex::Error> {
        let notifications = if config.notifications_enabled() {
            NotificationQueue::new(config.notifications.max_parallel)
        } else {
            NotificationQueue::disabled()
        };
        let options = WorkflowOptions::from_config(config);
        Ok(Self {
            roster: Roster {
                remember_seen: options.replay,
                ..Roster::default()
            },
            options,
            tailing: config.tailing.clone(),
            sim_delay: config.sim_delay_ms.map(Duration::from_millis),
            pipeline: Pipeline {
                classifier: LineClassifier::new()?,
                resolver: TimestampResolver::new(config.adjustment)?,
                files: Box::new(FsWorkflowFiles::new()?),
                registry,
            },
            delivery: Delivery {
                sink,
                notifications,
                dispatcher: Box::new(LoggingDispatcher),
            },
            probe: default_probe(),
            entries: Vec::new(),
            finished: Vec::new(),
        })
    }

    #[must_use]
    pub fn with_files(mut self, files: Box<dyn WorkflowFiles>) -> Self {
        self.pipeline.files = files;
        self
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Box<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Box<dyn NotificationDispatcher>) -> Self {
        self.delivery.dispatcher = dispatcher;
        self
    }

    /// Start tracking an output log. Returns `false` if it is already tracked.
    pub fn track(&mut self, spec: WorkflowSpec) -> bool {
        if !self.roster.admit(&spec.dagman_out) {
            tracing::debug!(path = %spec.dagman_out.display(), "Already tracked");
            return false;
        }
        self.entries.push(TrackedWorkflow::new(spec));
        true
    }

    /// Entries still in the live set.
    #[must_use]
    pub fn tracked(&self) -> &[TrackedWorkflow] {
        &self.entries
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.entries.is_empty()
    }

    /// Summaries of the workflows retired so far.
    #[must_use]
    pub fn finished(&self) -> &[WorkflowSummary] {
        &self.finished
    }

    #[must_use]
    pub fn pending_notifications(&self) -> usize {
        self.delivery.notifications.len()
    }

    /// Poll every due entry once and return how long to sleep.
    ///
    /// # Errors
    ///
    /// Returns an error if the event sink rejects an event.
    pub async fn run_cycle(&mut self) -> Result<Duration, SinkError> {
        let now = Instant::now();
        let Self {
            options,
            tailing,
            sim_delay,
            pipeline,
            delivery,
            probe,
            roster,
            entries,
            finished,
        } = &mut *self;

        let mut cycle = Cycle {
            pipeline,
            delivery,
            roster,
            finished,
            probe: &**probe,
            options,
            tailing,
            sim_delay: *sim_delay,
            spawned: Vec::new(),
        };
        for entry in entries.iter_mut() {
            if !cycle.options.replay && entry.wake_at > now {
                continue;
            }
            cycle.poll(entry).await?;
        }
        let spawned = std::mem::take(&mut cycle.spawned);
        let dispatched = cycle.delivery.service_notifications();
        if dispatched > 0 {
            tracing::debug!(dispatched, "Serviced notifications");
        }

        entries.retain(|entry| !entry.is_retired());
        entries.extend(spawned.into_iter().map(TrackedWorkflow::new));
        Ok(self.next_pause())
    }

    fn next_pause(&self) -> Duration {
        if self.options.replay {
            return Duration::ZERO;
        }
        let cap = Duration::from_secs(self.tailing.max_sleep_secs);
        let now = Instant::now();
        self.entries
            .iter()
            .map(|entry| entry.wake_at.saturating_duration_since(now))
            .min()
            .map_or(Duration::ZERO, |pause| pause.min(cap))
    }

    /// Retire every live entry as interrupted.
    ///
    /// # Errors
    ///
    /// Returns an error if the event sink rejects an end event.
    pub fn interrupt(&mut self) -> Result<(), SinkError> {
        for entry in &mut self.entries {
            retire_entry(
                entry,
                WorkflowExit::Fatal,
                &mut self.delivery,
                &mut self.finished,
            )?;
        }
        self.entries.clear();
        self.roster.live.clear();
        Ok(())
    }

    /// Drain notifications, close the sink and the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink or the registry cannot be closed.
    pub fn shutdown(mut self) -> Result<Vec<WorkflowSummary>, DaemonError> {
        let drained = self
            .delivery
            .notifications
            .drain(self.delivery.dispatcher.as_mut());
        if drained > 0 {
            tracing::info!(drained, "Drained pending notifications");
        }
        self.delivery.sink.close()?;
        self.pipeline.registry.close()?;
        Ok(self.finished)
    }

    /// Run cycles until no workflow is left or termination is requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink fails or shutdown cannot complete.
    pub async fn run(mut self, ctx: &DaemonContext) -> Result<RunReport, DaemonError> {
        let mut interrupted = false;
        loop {
            ctx.apply_verbosity();
            if ctx.shutting_down() {
                tracing::warn!(
                    tracked = self.entries.len(),
                    "Termination requested, finishing tracked workflows"
                );
                self.interrupt()?;
                interrupted = true;
                break;
            }
            if self.is_idle() {
                break;
            }

            let pause = self.run_cycle().await?;
            if self.is_idle() {
                break;
            }
            if pause.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                () = tokio::time::sleep(pause) => {}
                () = ctx.signals.notified() => {}
            }
        }

        tracing::info!("No workflows left, shutting down");
        let summaries = self.shutdown()?;
        Ok(RunReport {
            summaries,
            interrupted,
        })
    }

    #[cfg(test)]
    fn wake_all(&mut self) {
        let now = Instant::now();
        for entry in &mut self.entries {
            entry.wake_at = now;
        }
    }
}
