//! Ordered grammar of DAGMan output lines.
//!
//! Rules are tried in order and the first matching rule classifies the
//! line. Only lines that already carried a timestamp are classified.

use regex::{Captures, Regex};

use super::event::{ClassifiedEvent, FailureCause, ScriptKind, ScriptOutcome};

/// When a rule is allowed to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Always,
    /// Only right after the "All DAG node user log files:" marker.
    MultilinePending,
}

type Build = fn(&LineClassifier, &Captures<'_>, &str) -> Option<ClassifiedEvent>;

/// A single grammar rule.
#[derive(Debug, Clone)]
struct Rule {
    name: &'static str,
    pattern: Regex,
    gate: Gate,
    build: Build,
}

impl Rule {
    fn new(name: &'static str, pattern: &str, build: Build) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            pattern: Regex::new(pattern)?,
            gate: Gate::Always,
            build,
        })
    }

    fn gated(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }
}

/// Classifies a single log line against the DAGMan grammar.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    rules: Vec<Rule>,
    script_success: Regex,
    script_failure: Regex,
}

impl LineClassifier {
    /// Compile the grammar.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        let rules = vec![
            Rule::new("recovery-exited", r"\.\.\.done with RECOVERY mode", |_, _, _| {
                Some(ClassifiedEvent::RecoveryExited)
            })?,
            Rule::new(
                "job-event",
                r"Event:\s+ULOG_(\S+) for Condor (?:Job|Node) (\S+)\s+\((-?[0-9]+\.[0-9]+)(\.[0-9]+)?\)$",
                build_job_event,
            )?,
            Rule::new("job-submit", r"Submitting Condor Node (.+) job", |_, caps, _| {
                Some(ClassifiedEvent::JobSubmitted {
                    job_id: caps.get(1)?.as_str().to_string(),
                })
            })?,
            Rule::new("submit-error", r"ERROR: submit attempt failed", |_, _, _| {
                Some(ClassifiedEvent::SubmitError)
            })?,
            Rule::new(
                "script-running",
                r"\d{2}\sRunning (PRE|POST) script of (?:Job|Node) (.+)\.{3}",
                |_, caps, _| {
                    Some(ClassifiedEvent::ScriptStarted {
                        script: script_kind(caps.get(1)?.as_str()),
                        job_id: caps.get(2)?.as_str().to_string(),
                    })
                },
            )?,
            Rule::new(
                "script-done",
                r"\d{2}\s(PRE|POST) Script of (?:Job|Node) (\S+)",
                build_script_done,
            )?,
            Rule::new(
                "job-failed",
                r"\d{2}\sNode (\S+) job proc \(([0-9.]+)\) failed with (status|signal)\s+(-?\d+)\.$",
                build_job_failed,
            )?,
            Rule::new(
                "job-succeeded",
                r"\d{2}\sNode (\S+) job proc \(([0-9.]+)\) completed successfully\.$",
                |_, caps, _| {
                    Some(ClassifiedEvent::JobSucceeded {
                        job_id: caps.get(1)?.as_str().to_string(),
                        sched_id: caps.get(2)?.as_str().to_string(),
                    })
                },
            )?,
            Rule::new(
                "retry",
                r"Retrying node (\S+) \(retry #(\d+) of (\d+)\)",
                |_, caps, _| {
                    Some(ClassifiedEvent::Retry {
                        job_id: caps.get(1)?.as_str().to_string(),
                        attempt: caps.get(2)?.as_str().parse().ok()?,
                        max: caps.get(3)?.as_str().parse().ok()?,
                    })
                },
            )?,
            Rule::new(
                "engine-finished",
                r"\(condor_DAGMAN\)[\w\s]+EXITING WITH STATUS (\d+)$",
                |_, caps, _| {
                    Some(ClassifiedEvent::EngineFinished {
                        exit_code: caps.get(1)?.as_str().parse().ok(),
                    })
                },
            )?,
            Rule::new(
                "engine-startup",
                r"\*\* condor_scheduniv_exec\.([0-9.]+) \(CONDOR_DAGMAN\) STARTING UP",
                |_, caps, _| {
                    Some(ClassifiedEvent::EngineStartup {
                        condor_id: caps.get(1)?.as_str().to_string(),
                    })
                },
            )?,
            Rule::new("engine-pid", r"\*\* PID = (\d+)$", |_, caps, _| {
                Some(ClassifiedEvent::EnginePid {
                    pid: caps.get(1)?.as_str().parse().ok(),
                })
            })?,
            Rule::new("dag-name", r"Parsing (.+) ...$", |_, caps, _| {
                Some(ClassifiedEvent::DagNameParsed {
                    dag: caps.get(1)?.as_str().to_string(),
                })
            })?,
            Rule::new(
                "engine-version",
                r"\*\* \$CondorVersion: ((\d+\.\d+)\.\d+)",
                |_, caps, _| {
                    Some(ClassifiedEvent::EngineVersion {
                        version: caps.get(1)?.as_str().to_string(),
                        major: caps.get(2)?.as_str().to_string(),
                    })
                },
            )?,
            Rule::new(
                "common-log",
                r"Condor log will be written to ([^,]+)",
                build_common_log,
            )?,
            // Heuristic: any line indented by three or more blanks after the
            // marker is taken as the log path.
            Rule::new("common-log-indented", r"\d{2}\s{3,}(\S+)", build_common_log)?
                .gated(Gate::MultilinePending),
            Rule::new("multiline-marker", r"All DAG node user log files:", |_, _, _| {
                Some(ClassifiedEvent::MultilineLogMarker)
            })?,
            Rule::new("recovery-entered", r"Running in RECOVERY mode\.\.\.", |_, _, _| {
                Some(ClassifiedEvent::RecoveryEntered)
            })?,
            Rule::new("engine-aborted", r"Received SIGUSR1", |_, _, _| {
                Some(ClassifiedEvent::EngineAborted)
            })?,
        ];

        Ok(Self {
            rules,
            script_success: Regex::new(r"completed successfully\.$")?,
            script_failure: Regex::new(r"failed with status\s+(-?\d+)\.?$")?,
        })
    }

    /// Classify `line`. `multiline_pending` enables the indented common
    /// log rule.
    #[must_use]
    pub fn classify(&self, line: &str, multiline_pending: bool) -> Option<ClassifiedEvent> {
        for rule in &self.rules {
            if rule.gate == Gate::MultilinePending && !multiline_pending {
                continue;
            }
            if let Some(caps) = rule.pattern.captures(line) {
                tracing::trace!(rule = rule.name, "Line matched");
                return (rule.build)(self, &caps, line);
            }
        }
        None
    }

    /// Number of grammar rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn script_kind(raw: &str) -> ScriptKind {
    if raw.eq_ignore_ascii_case("PRE") {
        ScriptKind::Pre
    } else {
        ScriptKind::Post
    }
}

/// Parse an exit code, falling back to 1 when the field is malformed.
fn exit_code(raw: &str) -> i32 {
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(raw = %raw, "Unable to convert exit code to integer");
        1
    })
}

fn build_job_event(_: &LineClassifier, caps: &Captures<'_>, _: &str) -> Option<ClassifiedEvent> {
    Some(ClassifiedEvent::JobEvent {
        kind: caps.get(1)?.as_str().to_string(),
        job_id: caps.get(2)?.as_str().to_string(),
        sched_id: caps.get(3)?.as_str().to_string(),
        sub_id: caps
            .get(4)
            .map(|m| m.as_str().trim_start_matches('.').to_string()),
    })
}

fn build_script_done(
    classifier: &LineClassifier,
    caps: &Captures<'_>,
    line: &str,
) -> Option<ClassifiedEvent> {
    let outcome = if classifier.script_success.is_match(line) {
        ScriptOutcome::Success
    } else if let Some(failed) = classifier.script_failure.captures(line) {
        ScriptOutcome::Failure {
            code: exit_code(failed.get(1)?.as_str()),
        }
    } else {
        ScriptOutcome::Unknown
    };
    Some(ClassifiedEvent::ScriptTerminated {
        script: script_kind(caps.get(1)?.as_str()),
        job_id: caps.get(2)?.as_str().to_string(),
        outcome,
    })
}

fn build_job_failed(_: &LineClassifier, caps: &Captures<'_>, _: &str) -> Option<ClassifiedEvent> {
    let cause = if caps.get(3)?.as_str() == "signal" {
        FailureCause::Signal
    } else {
        FailureCause::Status
    };
    Some(ClassifiedEvent::JobFailed {
        job_id: caps.get(1)?.as_str().to_string(),
        sched_id: caps.get(2)?.as_str().to_string(),
        cause,
        code: exit_code(caps.get(4)?.as_str()),
    })
}

fn build_common_log(_: &LineClassifier, caps: &Captures<'_>, _: &str) -> Option<ClassifiedEvent> {
    Some(ClassifiedEvent::CommonLogLocation {
        path: caps.get(1)?.as_str().trim().to_string(),
    })
}
