//! Worker-side runtime.
//!
//! A worker program registers one action function; [`run_worker_main`]
//! wraps it with the protocol: handshake on startup, then one response per
//! action line until stdin closes.

use super::ipc::{LineReader, LineWriter};
use super::protocol::{WorkerReply, invalid_action};
use crate::pool::WorkerId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, warn};

/// Serve actions from `reader` until EOF, answering on `writer`.
///
/// Sends the handshake first. A line that does not decode as `A` is answered
/// with an `{"error": ...}` result so the coordinator can free the worker.
/// Returns the number of actions answered.
pub fn serve<R, W, A, Out, F>(
    reader: &mut LineReader<R>,
    writer: &mut LineWriter<W>,
    id: WorkerId,
    mut action: F,
) -> io::Result<u64>
where
    R: Read,
    W: Write,
    A: DeserializeOwned,
    Out: Serialize,
    F: FnMut(A) -> Out,
{
    writer.write_json(&WorkerReply::handshake(id))?;

    let mut answered = 0;
    while let Some(line) = reader.read_line()? {
        if line.trim().is_empty() {
            continue;
        }
        let result = match serde_json::from_str::<A>(line) {
            Ok(input) => serde_json::to_value(action(input))?,
            Err(e) => {
                warn!(worker_id = %id, error = %e, "Rejecting invalid action");
                invalid_action(&e)
            }
        };
        writer.write_json(&WorkerReply::response(id, result))?;
        answered += 1;
    }

    debug!(worker_id = %id, answered, "Worker input closed");
    Ok(answered)
}

/// Run `action` as this process's worker function over stdin/stdout and
/// exit when the coordinator closes stdin.
///
/// Nothing else in the process may write to stdout.
pub fn run_worker_main<A, Out, F>(action: F) -> !
where
    A: DeserializeOwned,
    Out: Serialize,
    F: FnMut(A) -> Out,
{
    // Pipe errors surface as io::Error instead of killing the process.
    // Safety: installing SIG_IGN does not run any handler code.
    unsafe {
        nix::sys::signal::signal(
            nix::sys::signal::Signal::SIGPIPE,
            nix::sys::signal::SigHandler::SigIgn,
        )
        .ok();
    }

    let id = WorkerId::new(std::process::id());
    let mut reader = LineReader::new(io::stdin().lock());
    let mut writer = LineWriter::new(io::stdout().lock());

    match serve(&mut reader, &mut writer, id, action) {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            eprintln!("Worker {} error: {}", id, e);
            std::process::exit(1);
        }
    }
}

/// Action of the built-in worker: waits `delay`, then reports which process
/// handled the action and when.
pub fn builtin_action(delay: Duration) -> impl FnMut(Value) -> Value {
    move |action| {
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let pid = std::process::id();
        let now = chrono::Local::now();
        json!({
            "pid": pid,
            "action": action,
            "message": format!("method completed for {} at {}", pid, now.format("%H:%M:%S")),
            "completed_at": now.to_rfc3339(),
        })
    }
}
