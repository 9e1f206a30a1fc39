//! Why a worker process ended.

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use std::fmt;

/// Reason a worker process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Normal exit with status code.
    Exited(i32),
    /// SIGKILL, usually the OOM killer or an operator.
    Killed,
    /// SIGSEGV or SIGBUS.
    Crashed(Signal),
    /// Killed by some other signal.
    Signaled(Signal),
    /// The process has not been reaped yet.
    StillAlive,
    Unknown,
}

impl TerminationReason {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {}", code),
            Self::Killed => write!(f, "killed (SIGKILL, possibly out of memory)"),
            Self::Crashed(sig) => write!(f, "crashed ({})", sig.as_str()),
            Self::Signaled(sig) => write!(f, "killed by signal {}", sig.as_str()),
            Self::StillAlive => write!(f, "still running"),
            Self::Unknown => write!(f, "unknown reason"),
        }
    }
}

/// Classify a `WaitStatus`.
pub fn analyze_wait_status(status: WaitStatus) -> TerminationReason {
    match status {
        WaitStatus::Exited(_, code) => TerminationReason::Exited(code),
        WaitStatus::Signaled(_, Signal::SIGKILL, _) => TerminationReason::Killed,
        WaitStatus::Signaled(_, sig @ (Signal::SIGSEGV | Signal::SIGBUS), _) => {
            TerminationReason::Crashed(sig)
        }
        WaitStatus::Signaled(_, sig, _) => TerminationReason::Signaled(sig),
        WaitStatus::StillAlive => TerminationReason::StillAlive,
        _ => TerminationReason::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Pid;

    #[test]
    fn test_analyze_exit() {
        let status = WaitStatus::Exited(Pid::from_raw(1), 3);
        assert_eq!(analyze_wait_status(status), TerminationReason::Exited(3));
        assert!(!TerminationReason::Exited(3).is_success());
        assert!(TerminationReason::Exited(0).is_success());
    }

    #[test]
    fn test_analyze_signals() {
        let pid = Pid::from_raw(1);
        assert_eq!(
            analyze_wait_status(WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            TerminationReason::Killed
        );
        assert_eq!(
            analyze_wait_status(WaitStatus::Signaled(pid, Signal::SIGSEGV, true)),
            TerminationReason::Crashed(Signal::SIGSEGV)
        );
        assert_eq!(
            analyze_wait_status(WaitStatus::Signaled(pid, Signal::SIGTERM, false)),
            TerminationReason::Signaled(Signal::SIGTERM)
        );
        assert_eq!(
            analyze_wait_status(WaitStatus::StillAlive),
            TerminationReason::StillAlive
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(TerminationReason::Exited(1).to_string(), "exited with code 1");
        assert!(
            TerminationReason::Signaled(Signal::SIGTERM)
                .to_string()
                .contains("SIGTERM")
        );
    }
}
