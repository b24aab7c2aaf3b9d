//! Sub-workflow discovery for DAG jobs that run a nested DAG.

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::files::{DagDescription, WorkflowFiles};
use crate::registry::{RegistryError, SubworkflowRegistry};

/// Parent job a sub-workflow was submitted by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParentLink {
    pub wf_uuid: String,
    pub job_id: String,
    pub submit_seq: u32,
}

/// A newly discovered sub-workflow to start tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubworkflowSpawn {
    pub dagman_out: PathBuf,
    pub root_wf_uuid: String,
    pub parent: ParentLink,
}

/// The sub-DAG `job_id` runs, if any.
pub fn sub_dag_for(
    run_dir: &Path,
    dag: &DagDescription,
    job_id: &str,
    files: &dyn WorkflowFiles,
) -> Option<PathBuf> {
    if let Some(sub_dag) = dag.subdags.get(job_id) {
        return Some(run_dir.join(sub_dag));
    }
    let submit_file = dag
        .jobs
        .get(job_id)
        .cloned()
        .unwrap_or_else(|| PathBuf::from(format!("{job_id}.sub")));
    let sub_dag = files.submit(&run_dir.join(submit_file))?.sub_dag?;
    Some(run_dir.join(sub_dag))
}

/// Resolve the output log of a sub-DAG and record the discovery.
///
/// Every call bumps the retry, replayed submits included: the registry
/// is rotated empty on restart and rebuilt from the log.
///
/// # Errors
///
/// Returns an error if the registry cannot be updated.
pub fn resolve_output(
    sub_dag: &Path,
    files: &dyn WorkflowFiles,
    registry: &mut SubworkflowRegistry,
) -> Result<PathBuf, RegistryError> {
    let key = sub_dag
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let retry = registry.record_discovery(&key)?;

    let rotated = PathBuf::from(format!("{}.{retry:03}", key.display()));
    let run_dir = if files.dir_exists(&rotated) { rotated } else { key.clone() };

    let dag_name = sub_dag
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dagman_out = run_dir.join(format!("{dag_name}.dagman.out"));
    registry.set_output(&key, &dagman_out)?;
    tracing::info!(
        sub_dag = %sub_dag.display(),
        retry,
        dagman_out = %dagman_out.display(),
        "Resolved sub-workflow"
    );
    Ok(dagman_out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::files::{parse_dag, FsWorkflowFiles};
    use tempfile::TempDir;

    #[test]
    fn test_subdag_external_is_found() {
        let files = FsWorkflowFiles::new().unwrap();
        let dag = parse_dag("SUBDAG EXTERNAL C inner/c.dag\n");
        assert_eq!(
            sub_dag_for(Path::new("/run"), &dag, "C", &files),
            Some(PathBuf::from("/run/inner/c.dag"))
        );
        assert_eq!(sub_dag_for(Path::new("/run"), &dag, "nope", &files), None);
    }

    #[test]
    fn test_submit_file_dag_argument() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("b.sub"),
            "arguments = \"-Dag sub/b.dag\"\n",
        )
        .unwrap();
        let files = FsWorkflowFiles::new().unwrap();
        let dag = parse_dag("JOB B b.sub\n");
        assert_eq!(
            sub_dag_for(dir.path(), &dag, "B", &files),
            Some(dir.path().join("sub/b.dag"))
        );
    }

    #[test]
    fn test_resolve_uses_rotated_dir_when_present() {
        let dir = TempDir::new().unwrap();
        let key = dir.path().join("sub");
        std::fs::create_dir_all(&key).unwrap();
        std::fs::create_dir_all(dir.path().join("sub.001")).unwrap();
        let files = FsWorkflowFiles::new().unwrap();
        let mut registry = SubworkflowRegistry::open_in_memory().unwrap();
        let dag = key.join("b.dag");

        let first = resolve_output(&dag, &files, &mut registry).unwrap();
        assert_eq!(first, key.join("b.dag.dagman.out"));
        let second = resolve_output(&dag, &files, &mut registry).unwrap();
        assert_eq!(second, dir.path().join("sub.001").join("b.dag.dagman.out"));
        let missing = resolve_output(&dag, &files, &mut registry).unwrap();
        assert_eq!(missing, key.join("b.dag.dagman.out"));
    }
}
