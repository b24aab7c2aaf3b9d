//! Local symlink to the engine's shared job log.

use std::path::{Path, PathBuf};

/// What happened when linking the common log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    AlreadyLinked,
    /// A regular file already sits at the link path.
    RegularFile,
    Created,
    /// The target exists but cannot be read.
    TargetUnreadable,
    Failed,
}

/// Canonical per-workflow log path: `run/x.dag.dagman.out` maps to
/// `run/x.log`.
#[must_use]
pub fn out2log(run_dir: &Path, dagman_out: &Path) -> PathBuf {
    let name = dagman_out
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = name.strip_suffix(".dagman.out").unwrap_or(&name);
    let base = base.strip_suffix(".dag").unwrap_or(base);
    run_dir.join(format!("{base}.log"))
}

/// Point `link` at `target`. Every failure is soft and only logged.
pub fn link_common_log(link: &Path, target: &Path) -> LinkOutcome {
    if link.is_symlink() {
        tracing::info!(link = %link.display(), "Symlink already exists");
        return LinkOutcome::AlreadyLinked;
    }
    if link.exists() {
        tracing::info!(link = %link.display(), "Regular file in place, not touching");
        return LinkOutcome::RegularFile;
    }
    if target.exists() && std::fs::File::open(target).is_err() {
        tracing::info!(target = %target.display(), "Common log exists but is not readable");
        return LinkOutcome::TargetUnreadable;
    }
    match make_link(target, link) {
        Ok(()) => {
            tracing::info!(link = %link.display(), target = %target.display(), "Linked common log");
            LinkOutcome::Created
        }
        Err(e) => {
            tracing::info!(target = %target.display(), error = %e, "Unable to symlink common log");
            LinkOutcome::Failed
        }
    }
}

#[cfg(unix)]
fn make_link(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_link(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks not supported",
    ))
}
