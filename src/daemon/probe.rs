//! Engine liveness probe.

/// Answers whether a process still exists.
pub trait ProcessProbe: Send {
    fn is_alive(&self, pid: i32) -> bool;
}

/// Signal-zero probe.
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct NixProbe;

#[cfg(unix)]
impl ProcessProbe for NixProbe {
    fn is_alive(&self, pid: i32) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if pid <= 0 {
            return false;
        }
        match kill(Pid::from_raw(pid), None::<Signal>) {
            Ok(()) | Err(Errno::EPERM) => true,
            Err(Errno::ESRCH) => false,
            Err(e) => {
                tracing::debug!(pid, error = %e, "Liveness probe inconclusive");
                true
            }
        }
    }
}

/// Probe used where signal-zero is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeAlive;

impl ProcessProbe for AssumeAlive {
    fn is_alive(&self, _pid: i32) -> bool {
        true
    }
}

/// The platform's probe.
#[must_use]
pub fn default_probe() -> Box<dyn ProcessProbe> {
    #[cfg(unix)]
    {
        Box::new(NixProbe)
    }
    #[cfg(not(unix))]
    {
        Box::new(AssumeAlive)
    }
}
