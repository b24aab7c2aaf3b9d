//! Readers for the files a run directory carries next to the output log.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;

/// `braindump.txt` contents relevant to monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Braindump {
    pub wf_uuid: Option<String>,
    pub root_wf_uuid: Option<String>,
}

/// Jobs declared by a DAG file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DagDescription {
    /// Job name to submit file.
    pub jobs: HashMap<String, PathBuf>,
    /// `SUBDAG EXTERNAL` name to DAG file.
    pub subdags: HashMap<String, PathBuf>,
}

impl DagDescription {
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.jobs.len() + self.subdags.len()
    }
}

/// Hints read from a job's submit description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmitDescription {
    pub site: Option<String>,
    pub walltime_minutes: Option<u64>,
    /// DAG file passed with `-Dag`, marking a sub-workflow job.
    pub sub_dag: Option<PathBuf>,
}

/// Access to run directory files.
pub trait WorkflowFiles {
    fn braindump(&self, run_dir: &Path) -> Option<Braindump>;
    fn dag(&self, dag_file: &Path) -> Option<DagDescription>;
    fn submit(&self, submit_file: &Path) -> Option<SubmitDescription>;
    fn dir_exists(&self, path: &Path) -> bool;
}

/// Reads files straight from disk.
#[derive(Debug, Clone)]
pub struct FsWorkflowFiles {
    maxwalltime: Regex,
    dag_argument: Regex,
}

impl FsWorkflowFiles {
    /// # Errors
    ///
    /// Returns an error if a built-in pattern fails to compile.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            maxwalltime: Regex::new(r"\(maxwalltime=(\d+)\)")?,
            dag_argument: Regex::new(r#"-Dag\s+"?([^"\s]+)"#)?,
        })
    }

    /// Parse submit description text.
    #[must_use]
    pub fn parse_submit(&self, content: &str) -> SubmitDescription {
        let mut desc = SubmitDescription::default();
        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();
            match key.as_str() {
                "+pegasus_site" => {
                    let site = value.trim_matches('"');
                    if !site.is_empty() {
                        desc.site = Some(site.to_string());
                    }
                }
                "globusrsl" => {
                    if let Some(caps) = self.maxwalltime.captures(value) {
                        desc.walltime_minutes = caps[1].parse().ok();
                    }
                }
                "+maxwalltime" => {
                    desc.walltime_minutes = value.trim_matches('"').parse().ok();
                }
                "arguments" => {
                    if let Some(caps) = self.dag_argument.captures(value) {
                        desc.sub_dag = Some(PathBuf::from(&caps[1]));
                    }
                }
                _ => {}
            }
        }
        desc
    }
}

impl WorkflowFiles for FsWorkflowFiles {
    fn braindump(&self, run_dir: &Path) -> Option<Braindump> {
        let path = run_dir.join("braindump.txt");
        let content = std::fs::read_to_string(&path)
            .map_err(|e| tracing::debug!(path = %path.display(), error = %e, "No braindump"))
            .ok()?;
        Some(parse_braindump(&content))
    }

    fn dag(&self, dag_file: &Path) -> Option<DagDescription> {
        match std::fs::read_to_string(dag_file) {
            Ok(content) => Some(parse_dag(&content)),
            Err(e) => {
                tracing::warn!(path = %dag_file.display(), error = %e, "Unable to read DAG file");
                None
            }
        }
    }

    fn submit(&self, submit_file: &Path) -> Option<SubmitDescription> {
        let content = std::fs::read_to_string(submit_file)
            .map_err(|e| {
                tracing::debug!(path = %submit_file.display(), error = %e, "Unable to read submit file");
            })
            .ok()?;
        Some(self.parse_submit(&content))
    }

    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

/// Parse `key value` braindump lines.
#[must_use]
pub fn parse_braindump(content: &str) -> Braindump {
    let mut dump = Braindump::default();
    for line in content.lines() {
        let mut parts = line.trim().splitn(2, char::is_whitespace);
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let value = value.trim().to_string();
        match key {
            "wf_uuid" => dump.wf_uuid = Some(value),
            "root_wf_uuid" => dump.root_wf_uuid = Some(value),
            _ => {}
        }
    }
    dump
}

/// Parse the `JOB` and `SUBDAG EXTERNAL` lines of a DAG file.
#[must_use]
pub fn parse_dag(content: &str) -> DagDescription {
    let mut dag = DagDescription::default();
    for line in content.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [kw, name, file, ..] if kw.eq_ignore_ascii_case("JOB") => {
                dag.jobs.insert((*name).to_string(), PathBuf::from(file));
            }
            [kw, ext, name, file, ..]
                if kw.eq_ignore_ascii_case("SUBDAG") && ext.eq_ignore_ascii_case("EXTERNAL") =>
            {
                dag.subdags.insert((*name).to_string(), PathBuf::from(file));
            }
            _ => {}
        }
    }
    dag
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_dag() {
        let dag = parse_dag(
            "# comment\nJOB A a.sub\nJOB B b.sub DIR x\nSUBDAG EXTERNAL C inner/c.dag\nPARENT A CHILD B\n",
        );
        assert_eq!(dag.jobs.get("A"), Some(&PathBuf::from("a.sub")));
        assert_eq!(dag.subdags.get("C"), Some(&PathBuf::from("inner/c.dag")));
        assert_eq!(dag.job_count(), 3);
    }

    #[test]
    fn test_parse_braindump() {
        let dump = parse_braindump("wf_uuid 1234\nroot_wf_uuid abcd\ndax foo.dax\n");
        assert_eq!(dump.wf_uuid.as_deref(), Some("1234"));
        assert_eq!(dump.root_wf_uuid.as_deref(), Some("abcd"));
    }

    #[test]
    fn test_parse_submit_hints() {
        let files = FsWorkflowFiles::new().unwrap();
        let desc = files.parse_submit(
            "universe = vanilla\n+pegasus_site = \"condorpool\"\nglobusrsl = (jobtype=single)(maxwalltime=15)\n",
        );
        assert_eq!(desc.site.as_deref(), Some("condorpool"));
        assert_eq!(desc.walltime_minutes, Some(15));
        assert_eq!(desc.sub_dag, None);
    }

    #[test]
    fn test_parse_submit_sub_dag() {
        let files = FsWorkflowFiles::new().unwrap();
        let desc = files.parse_submit(
            "arguments = \"-f -l . -Debug 3 -Dag inner/sub.dag -Rescue 100\"\n+maxwalltime = 7\n",
        );
        assert_eq!(desc.sub_dag, Some(PathBuf::from("inner/sub.dag")));
        assert_eq!(desc.walltime_minutes, Some(7));
    }

    #[test]
    fn test_fs_reads_run_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("braindump.txt"), "wf_uuid w-1\n").unwrap();
        std::fs::write(dir.path().join("x.dag"), "JOB A a.sub\n").unwrap();
        let files = FsWorkflowFiles::new().unwrap();
        assert_eq!(
            files.braindump(dir.path()).unwrap().wf_uuid.as_deref(),
            Some("w-1")
        );
        assert_eq!(files.dag(&dir.path().join("x.dag")).unwrap().jobs.len(), 1);
        assert!(files.dag(&dir.path().join("missing.dag")).is_none());
        assert!(files.dir_exists(dir.path()));
    }
}
