//! The seam between scheduling and the processes doing the work.

use super::handle::WorkerId;
use crate::worker::protocol::WorkerReply;
use crate::worker::signals::TerminationReason;
use crossbeam_channel::Receiver;
use serde_json::Value;
use std::io;
use std::time::Duration;

/// Something that arrived from a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A well-formed message read from the worker's channel.
    Reply { from: WorkerId, reply: WorkerReply },
    /// A line that is not a valid reply.
    Malformed {
        from: WorkerId,
        line: String,
        error: String,
    },
    /// The worker's channel closed (EOF or read error).
    Closed { from: WorkerId },
}

impl WorkerEvent {
    pub fn from(&self) -> WorkerId {
        match self {
            Self::Reply { from, .. } | Self::Malformed { from, .. } | Self::Closed { from } => {
                *from
            }
        }
    }
}

/// Sends actions to workers and tears them down.
///
/// Everything coming back from workers is delivered separately, as
/// [`WorkerEvent`]s on the receiver returned alongside the transport.
pub trait Transport {
    /// Write one action to a worker's channel.
    fn send(&mut self, worker: WorkerId, action: &Value) -> io::Result<()>;

    /// Why a worker went away, if that can be determined.
    fn termination(&mut self, worker: WorkerId) -> Option<TerminationReason>;

    /// Stop every worker, waiting up to `grace` for each to exit on its own.
    fn shutdown(&mut self, grace: Duration);
}

/// A started set of workers: the transport, its event stream and the ids it
/// spawned.
pub struct Spawned<T> {
    pub transport: T,
    pub events: Receiver<WorkerEvent>,
    pub workers: Vec<WorkerId>,
}
