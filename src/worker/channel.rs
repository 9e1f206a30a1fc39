//! Process-backed [`Transport`]: one collector thread per worker turns its
//! stdout into [`WorkerEvent`]s on a shared channel.
//!
//! ```text
//!   coordinator thread                      worker processes
//!   ┌──────────────┐  action line (stdin)   ┌──────────┐
//!   │              │ ─────────────────────▶ │ worker A │
//!   │ Coordinator  │                        └────┬─────┘
//!   │              │◀── WorkerEvent ── collector A (stdout)
//!   │              │◀── WorkerEvent ── collector B (stdout)
//!   └──────────────┘                        ┌──────────┐
//!                    ─────────────────────▶ │ worker B │
//!                                           └──────────┘
//! ```

use super::ipc::{LineReader, PipeFd};
use super::proc::Proc;
use super::protocol::WorkerReply;
use super::signals::TerminationReason;
use super::spawn::{SpawnedWorker, spawn_collector_thread, spawn_worker};
use crate::config::WorkerEntryPoint;
use crate::error::Result;
use crate::pool::{Spawned, Transport, WorkerEvent, WorkerId};
use crossbeam_channel::{Sender, unbounded};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Worker processes talking over their stdin/stdout.
pub struct ProcessTransport {
    procs: BTreeMap<WorkerId, Proc>,
}

impl ProcessTransport {
    /// Spawn `count` workers running `entry`.
    ///
    /// If any spawn fails, the workers already started are stopped and the
    /// error is returned.
    pub fn spawn(entry: &WorkerEntryPoint, count: usize) -> Result<Spawned<Self>> {
        let (tx, events) = unbounded();
        let mut transport = Self {
            procs: BTreeMap::new(),
        };
        let mut workers = Vec::with_capacity(count);

        for _ in 0..count {
            match transport.spawn_one(entry, &tx) {
                Ok(id) => workers.push(id),
                Err(e) => {
                    transport.shutdown(Duration::from_millis(500));
                    return Err(e);
                }
            }
        }

        Ok(Spawned {
            transport,
            events,
            workers,
        })
    }

    fn spawn_one(&mut self, entry: &WorkerEntryPoint, tx: &Sender<WorkerEvent>) -> Result<WorkerId> {
        let SpawnedWorker { proc, stdout } = spawn_worker(entry)?;
        let id = proc.worker_id();
        // Insert first so the process is cleaned up if the thread fails.
        self.procs.insert(id, proc);

        let tx = tx.clone();
        spawn_collector_thread(format!("procpool-collector-{}", id), move || {
            collect(id, LineReader::new(stdout), tx)
        })?;
        debug!(worker_id = %id, "Spawned worker process");
        Ok(id)
    }
}

/// Forward every line a worker writes until its stdout closes.
fn collect(from: WorkerId, mut reader: LineReader<PipeFd>, events: Sender<WorkerEvent>) {
    loop {
        let event = match reader.read_line() {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                trace!(worker_id = %from, line, "Worker returned message");
                match WorkerReply::from_line(line) {
                    Ok(reply) => WorkerEvent::Reply { from, reply },
                    Err(e) => WorkerEvent::Malformed {
                        from,
                        line: line.to_string(),
                        error: e.to_string(),
                    },
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(worker_id = %from, error = %e, "Failed to read from worker");
                break;
            }
        };
        if events.send(event).is_err() {
            // Coordinator is gone.
            return;
        }
    }
    let _ = events.send(WorkerEvent::Closed { from });
}

impl Transport for ProcessTransport {
    fn send(&mut self, worker: WorkerId, action: &Value) -> io::Result<()> {
        match self.procs.get_mut(&worker) {
            Some(proc) => proc.send(action),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no worker process {}", worker),
            )),
        }
    }

    fn termination(&mut self, worker: WorkerId) -> Option<TerminationReason> {
        self.procs.get_mut(&worker).map(Proc::termination)
    }

    fn shutdown(&mut self, grace: Duration) {
        // Close every stdin first so the workers wind down in parallel.
        for proc in self.procs.values_mut() {
            proc.close_stdin();
        }
        for (id, proc) in self.procs.iter_mut() {
            if let Err(e) = proc.stop(grace) {
                warn!(worker_id = %id, error = %e, "Failed to stop worker");
            }
        }
        self.procs.clear();
    }
}
