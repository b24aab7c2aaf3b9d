//! Line-level scenarios driven through the public workflow API.

use std::path::{Path, PathBuf};

use dagman_monitor::classify::LineClassifier;
use dagman_monitor::events::{EventKind, MonitorEvent};
use dagman_monitor::jobs::JobState;
use dagman_monitor::registry::{SubworkflowRegistry, REGISTRY_FILE};
use dagman_monitor::timestamp::TimestampResolver;
use dagman_monitor::workflow::{
    FsWorkflowFiles, LineContext, RecoveryMarker, SubworkflowSpawn, Workflow, WorkflowOptions,
    WorkflowSpec, RECOVERY_FILE,
};
use tempfile::TempDir;

struct RunDir {
    dir: TempDir,
    classifier: LineClassifier,
    resolver: TimestampResolver,
    files: FsWorkflowFiles,
}

impl RunDir {
    fn new(dag: &str) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("braindump.txt"), "wf_uuid wf-1\nroot_wf_uuid wf-1\n")
            .unwrap();
        std::fs::write(dir.path().join("test.dag"), dag).unwrap();
        Self {
            dir,
            classifier: LineClassifier::new().unwrap(),
            resolver: TimestampResolver::new(0).unwrap(),
            files: FsWorkflowFiles::new().unwrap(),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn workflow(&self) -> Workflow {
        let options = WorkflowOptions {
            follow_subworkflows: true,
            ..WorkflowOptions::default()
        };
        Workflow::open(
            WorkflowSpec::root(self.path().join("test.dag.dagman.out")),
            &self.files,
            options,
        )
        .expect("Failed to open workflow")
    }

    /// Feed `lines`, returning the events produced by each line.
    fn feed(
        &self,
        workflow: &mut Workflow,
        registry: &mut SubworkflowRegistry,
        lines: &[&str],
    ) -> (Vec<Vec<MonitorEvent>>, Vec<SubworkflowSpawn>) {
        let mut ctx = LineContext {
            classifier: &self.classifier,
            resolver: &self.resolver,
            files: &self.files,
            registry,
        };
        let mut per_line = Vec::new();
        let mut spawns = Vec::new();
        for line in lines {
            spawns.extend(workflow.process_line(line, &mut ctx));
            per_line.push(workflow.take_events());
        }
        (per_line, spawns)
    }
}

fn flatten(per_line: Vec<Vec<MonitorEvent>>) -> Vec<MonitorEvent> {
    per_line.into_iter().flatten().collect()
}

const RUN: &[&str] = &[
    "03/05/24 10:20:30 ** condor_scheduniv_exec.9.0 (CONDOR_DAGMAN) STARTING UP",
    "03/05/24 10:20:30 Parsing test.dag ...",
    "03/05/24 10:20:31 Submitting Condor Node A job(s)...",
    "03/05/24 10:20:31 Event: ULOG_SUBMIT for Condor Node A (77.0.0)",
    "03/05/24 10:21:00 Event: ULOG_EXECUTE for Condor Node A (77.0.0)",
    "03/05/24 10:25:00 Event: ULOG_JOB_TERMINATED for Condor Node A (77.0.0)",
    "03/05/24 10:25:00 Node A job proc (77.0) completed successfully.",
    "03/05/24 10:25:10 **** condor_scheduniv_exec.9.0 (condor_DAGMAN) pid 1 EXITING WITH STATUS 0",
];

#[test]
fn test_start_submit_success_share_submit_seq() {
    let run = RunDir::new("JOB A a.sub\n");
    let mut registry = SubworkflowRegistry::open_in_memory().unwrap();
    let mut workflow = run.workflow();
    let (per_line, _) = run.feed(
        &mut workflow,
        &mut registry,
        &[
            "03/05/24 10:20:30 ** condor_scheduniv_exec.9.0 (CONDOR_DAGMAN) STARTING UP",
            "03/05/24 10:20:30 Parsing test.dag ...",
            "03/05/24 10:20:31 Event: ULOG_SUBMIT for Condor Node A (77.0.0)",
            "03/05/24 10:25:00 Node A job proc (77.0) completed successfully.",
        ],
    );
    let events = flatten(per_line);
    let kinds: Vec<_> = events.iter().map(|e| e.kind.clone()).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::WorkflowStarted,
            EventKind::Job(JobState::Submit),
            EventKind::Job(JobState::JobSuccess),
        ]
    );
    assert_eq!(events[1].job_id.as_deref(), Some("A"));
    assert_eq!(events[1].submit_seq, events[2].submit_seq);
    assert_eq!(events[2].status, Some(0));
}

#[test]
fn test_submit_error_goes_to_last_submitted_job() {
    let run = RunDir::new("JOB A a.sub\n");
    let mut registry = SubworkflowRegistry::open_in_memory().unwrap();
    let mut workflow = run.workflow();
    let (per_line, _) = run.feed(
        &mut workflow,
        &mut registry,
        &[
            "03/05/24 10:20:31 Event: ULOG_SUBMIT for Condor Node A (77.0.0)",
            "03/05/24 10:20:32 ERROR: submit attempt failed",
        ],
    );
    let events = flatten(per_line);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, EventKind::Job(JobState::Submit));
    assert_eq!(events[1].kind, EventKind::Job(JobState::SubmitFailed));
    assert_eq!(events[1].job_id.as_deref(), Some("A"));
    assert_eq!(events[0].submit_seq, events[1].submit_seq);
}

#[test]
fn test_recovery_block_emits_nothing_but_counts_lines() {
    let run = RunDir::new("JOB A a.sub\n");
    let mut registry = SubworkflowRegistry::open_in_memory().unwrap();
    let mut workflow = run.workflow();
    let before = workflow.state().line;
    let (per_line, _) = run.feed(
        &mut workflow,
        &mut registry,
        &[
            "03/05/24 10:20:30 Running in RECOVERY mode... >>>>>>>>>>",
            "03/05/24 10:20:31 Event: ULOG_SUBMIT for Condor Node A (77.0.0)",
            "03/05/24 10:20:32 Event: ULOG_EXECUTE for Condor Node A (77.0.0)",
            "03/05/24 10:20:33 Event: ULOG_JOB_TERMINATED for Condor Node A (77.0.0)",
            "03/05/24 10:20:34 ...done with RECOVERY mode <<<<<<<<<<",
        ],
    );
    assert!(flatten(per_line).is_empty());
    assert_eq!(workflow.state().line, before + 5);
    assert!(!workflow.state().skipping_recovery_lines);
}

#[test]
fn test_registry_retry_is_carried_across_runs() {
    let run = RunDir::new("SUBDAG EXTERNAL B inner/b.dag\n");
    let db = run.path().join(REGISTRY_FILE);
    let key = run.path().join("inner");
    {
        let mut registry = SubworkflowRegistry::open(&db).unwrap();
        for _ in 0..3 {
            registry.record_discovery(&key).unwrap();
        }
        assert_eq!(registry.get(&key).unwrap().unwrap().retry, 2);
        registry.close().unwrap();
    }

    let mut registry = SubworkflowRegistry::open(&db).unwrap();
    let mut workflow = run.workflow();
    let (_, spawns) = run.feed(
        &mut workflow,
        &mut registry,
        &[
            "03/05/24 10:20:30 Parsing test.dag ...",
            "03/05/24 10:20:31 Event: ULOG_SUBMIT for Condor Node B (80.0.0)",
        ],
    );
    assert_eq!(spawns.len(), 1);
    assert_eq!(spawns[0].dagman_out, key.join("b.dag.dagman.out"));
    assert_eq!(registry.get(&key).unwrap().unwrap().retry, 3);
}

#[test]
fn test_rotated_subworkflow_directory_is_used_when_present() {
    let run = RunDir::new("SUBDAG EXTERNAL B inner/b.dag\n");
    let rotated = run.path().join("inner.000");
    std::fs::create_dir(&rotated).unwrap();
    let mut registry = SubworkflowRegistry::open_in_memory().unwrap();
    let mut workflow = run.workflow();
    let (_, spawns) = run.feed(
        &mut workflow,
        &mut registry,
        &[
            "03/05/24 10:20:30 Parsing test.dag ...",
            "03/05/24 10:20:31 Event: ULOG_SUBMIT for Condor Node B (80.0.0)",
        ],
    );
    assert_eq!(spawns[0].dagman_out, rotated.join("b.dag.dagman.out"));
}

#[test]
fn test_replay_after_marker_is_idempotent() {
    let run = RunDir::new("JOB A a.sub\n");

    let mut registry = SubworkflowRegistry::open_in_memory().unwrap();
    let mut first = run.workflow();
    let (full, _) = run.feed(&mut first, &mut registry, RUN);

    for marker in [0_u64, 3, 5, 8] {
        let path: PathBuf = run.path().join(RECOVERY_FILE);
        RecoveryMarker::new(marker, 0).save(&path).unwrap();

        let mut registry = SubworkflowRegistry::open_in_memory().unwrap();
        let mut again = run.workflow();
        assert_eq!(again.state().previous_processed_line, marker);
        let (replayed, _) = run.feed(&mut again, &mut registry, RUN);

        let skip = usize::try_from(marker).unwrap();
        assert!(replayed[..skip].iter().all(Vec::is_empty));
        assert_eq!(replayed[skip..], full[skip..]);
        std::fs::remove_file(&path).unwrap();
    }
}

#[test]
fn test_restart_with_marker_rebuilds_subworkflow_retries() {
    let run = RunDir::new("SUBDAG EXTERNAL B inner/b.dag\n");
    for dir in ["inner", "inner.001", "inner.002"] {
        std::fs::create_dir(run.path().join(dir)).unwrap();
    }
    let lines = [
        "03/05/24 10:20:30 Parsing test.dag ...",
        "03/05/24 10:20:31 Event: ULOG_SUBMIT for Condor Node B (80.0.0)",
        "03/05/24 10:21:00 Node B job proc (80.0) failed with status 1.",
        "03/05/24 10:21:10 Event: ULOG_SUBMIT for Condor Node B (81.0.0)",
        "03/05/24 10:22:00 Node B job proc (81.0) failed with status 1.",
        "03/05/24 10:22:10 Event: ULOG_SUBMIT for Condor Node B (82.0.0)",
    ];
    let expected: Vec<PathBuf> = ["inner", "inner.001", "inner.002"]
        .iter()
        .map(|dir| run.path().join(dir).join("b.dag.dagman.out"))
        .collect();

    let mut registry = SubworkflowRegistry::open_in_memory().unwrap();
    let mut fresh = run.workflow();
    let (_, spawns) = run.feed(&mut fresh, &mut registry, &lines);
    let fresh_paths: Vec<_> = spawns.into_iter().map(|s| s.dagman_out).collect();
    assert_eq!(fresh_paths, expected);

    let marker = run.path().join(RECOVERY_FILE);
    RecoveryMarker::new(5, 0).save(&marker).unwrap();
    let mut registry = SubworkflowRegistry::open_in_memory().unwrap();
    let mut restarted = run.workflow();
    assert_eq!(restarted.state().previous_processed_line, 5);
    let (per_line, spawns) = run.feed(&mut restarted, &mut registry, &lines);
    let restarted_paths: Vec<_> = spawns.into_iter().map(|s| s.dagman_out).collect();
    assert_eq!(restarted_paths, expected);
    assert!(per_line[..5].iter().all(Vec::is_empty));
    assert_eq!(
        registry.get(&run.path().join("inner")).unwrap().unwrap().retry,
        2
    );
}
