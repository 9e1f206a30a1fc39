//! Worker subprocess spawning.
//!
//! Workers are started with `std::process::Command` (posix_spawn where
//! available) with stdin/stdout piped for IPC and stderr inherited, so worker
//! logs land in the coordinator's terminal.

use super::ipc::PipeFd;
use super::proc::Proc;
use crate::config::WorkerEntryPoint;
use crate::error::{PoolError, Result};
use nix::unistd::Pid;
use std::process::{Command, Stdio};
use std::thread::JoinHandle;

/// Stack size for collector threads. They only parse lines.
pub const COLLECTOR_STACK_SIZE: usize = 256 * 1024;

/// A freshly spawned worker: the coordinator-side handle and the read end of
/// its stdout.
pub struct SpawnedWorker {
    pub proc: Proc,
    pub stdout: PipeFd,
}

/// Spawn one worker process running `entry`.
pub fn spawn_worker(entry: &WorkerEntryPoint) -> Result<SpawnedWorker> {
    let mut cmd = Command::new(&entry.program);
    cmd.args(&entry.args);
    cmd.envs(entry.env.iter().map(|(k, v)| (k, v)));

    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());

    let mut child = cmd.spawn().map_err(|e| {
        PoolError::Startup(format!(
            "failed to spawn worker '{}': {}",
            entry.program.display(),
            e
        ))
    })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| PoolError::Startup("worker stdin not captured".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PoolError::Startup("worker stdout not captured".into()))?;

    // The Proc reaps the child with waitpid from here on.
    let pid = Pid::from_raw(child.id() as i32);
    Ok(SpawnedWorker {
        proc: Proc::new(pid, stdin.into()),
        stdout: stdout.into(),
    })
}

/// Spawn a named collector thread.
pub fn spawn_collector_thread<F>(name: String, f: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name)
        .stack_size(COLLECTOR_STACK_SIZE)
        .spawn(f)
        .map_err(|e| PoolError::Startup(format!("failed to spawn collector thread: {}", e)))
}
