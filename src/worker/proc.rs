//! Handle to one worker subprocess.
//!
//! The coordinator keeps the write end of the worker's stdin here; its stdout
//! is owned by a collector thread (see [`super::channel`]).

use super::ipc::{LineWriter, PipeFd};
use super::protocol::action_line;
use super::signals::{TerminationReason, analyze_wait_status};
use crate::error::{PoolError, Result};
use crate::pool::WorkerId;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use serde_json::Value;
use std::io;
use std::time::{Duration, Instant};

/// Handle to a running worker process.
pub struct Proc {
    pid: Pid,
    /// `None` once stdin has been closed.
    stdin: Option<LineWriter<PipeFd>>,
    /// Exit status, once reaped.
    status: Option<WaitStatus>,
}

impl Proc {
    pub fn new(pid: Pid, stdin: PipeFd) -> Self {
        Self {
            pid,
            stdin: Some(LineWriter::new(stdin)),
            status: None,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        WorkerId::new(self.pid.as_raw() as u32)
    }

    /// Write one action line to the worker.
    pub fn send(&mut self, action: &Value) -> io::Result<()> {
        match self.stdin.as_mut() {
            Some(writer) => writer.write_line(&action_line(action)),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "worker stdin already closed",
            )),
        }
    }

    /// Close the worker's stdin. A worker exits when it sees EOF.
    pub fn close_stdin(&mut self) {
        self.stdin = None;
    }

    fn reap(&mut self, flags: Option<WaitPidFlag>) -> Result<Option<WaitStatus>> {
        if let Some(status) = self.status {
            return Ok(Some(status));
        }
        match waitpid(self.pid, flags) {
            Ok(WaitStatus::StillAlive) => Ok(None),
            Ok(status) => {
                self.status = Some(status);
                Ok(Some(status))
            }
            Err(e) => Err(PoolError::Io(io::Error::from_raw_os_error(e as i32))),
        }
    }

    /// Non-blocking check for exit.
    pub fn try_wait(&mut self) -> Result<Option<WaitStatus>> {
        self.reap(Some(WaitPidFlag::WNOHANG))
    }

    /// Why the process ended, or [`TerminationReason::StillAlive`].
    pub fn termination(&mut self) -> TerminationReason {
        match self.try_wait() {
            Ok(Some(status)) => analyze_wait_status(status),
            Ok(None) => TerminationReason::StillAlive,
            Err(_) => TerminationReason::Unknown,
        }
    }

    /// Send SIGTERM.
    pub fn terminate(&self) -> Result<()> {
        if self.status.is_some() {
            return Ok(());
        }
        signal::kill(self.pid, Signal::SIGTERM)
            .map_err(|e| PoolError::Io(io::Error::from_raw_os_error(e as i32)))
    }

    /// Send SIGKILL and reap.
    pub fn kill(&mut self) -> Result<()> {
        if self.status.is_some() {
            return Ok(());
        }
        signal::kill(self.pid, Signal::SIGKILL)
            .map_err(|e| PoolError::Io(io::Error::from_raw_os_error(e as i32)))?;
        self.reap(None)?;
        Ok(())
    }

    /// Close stdin and give the worker `grace` to exit, then escalate to
    /// SIGTERM and finally SIGKILL.
    pub fn stop(&mut self, grace: Duration) -> Result<()> {
        self.close_stdin();

        let start = Instant::now();
        while start.elapsed() < grace {
            if self.try_wait()?.is_some() {
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        self.terminate()?;
        std::thread::sleep(Duration::from_millis(100));
        if self.try_wait()?.is_some() {
            return Ok(());
        }

        self.kill()
    }
}

impl Drop for Proc {
    fn drop(&mut self) {
        if self.status.is_none() {
            self.close_stdin();
            let _ = self.terminate();
            std::thread::sleep(Duration::from_millis(10));
            if let Ok(Some(_)) = self.try_wait() {
                return;
            }
            let _ = self.kill();
        }
    }
}
