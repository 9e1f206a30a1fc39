//! Per-worker bookkeeping held by the coordinator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identity of a worker process (its pid).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(u32);

impl WorkerId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Completion handler: receives the caller's context back together with the
/// worker's result. Runs on the coordinator thread.
pub type Handler<C> = Box<dyn FnOnce(C, Value) -> anyhow::Result<()>>;

/// Lifecycle of a worker handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Process spawned, startup handshake not received yet.
    AwaitingHandshake,
    /// Handshake done and no request in flight.
    Available,
    /// A request is in flight.
    Busy,
    /// The worker's stdout closed. Terminal.
    Exited,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AwaitingHandshake => "awaiting-handshake",
            Self::Available => "available",
            Self::Busy => "busy",
            Self::Exited => "exited",
        };
        f.write_str(s)
    }
}

/// Caller data travelling with an in-flight request.
pub struct Binding<C> {
    pub context: C,
    pub handler: Handler<C>,
}

impl<C> Binding<C> {
    pub fn new(context: C, handler: Handler<C>) -> Self {
        Self { context, handler }
    }

    /// Hand the result to the caller.
    pub fn complete(self, result: Value) -> anyhow::Result<()> {
        (self.handler)(self.context, result)
    }
}

impl<C> fmt::Debug for Binding<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Context and handler are opaque.
        f.debug_struct("Binding").finish_non_exhaustive()
    }
}

/// A worker as seen by the coordinator.
#[derive(Debug)]
pub struct WorkerHandle<C> {
    id: WorkerId,
    state: WorkerState,
    binding: Option<Binding<C>>,
    dispatched: u64,
}

impl<C> WorkerHandle<C> {
    pub(crate) fn new(id: WorkerId) -> Self {
        Self {
            id,
            state: WorkerState::AwaitingHandshake,
            binding: None,
            dispatched: 0,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_available(&self) -> bool {
        self.state == WorkerState::Available
    }

    /// Whether a request is bound to this worker.
    pub fn has_binding(&self) -> bool {
        self.binding.is_some()
    }

    /// Requests dispatched to this worker so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub(crate) fn set_state(&mut self, state: WorkerState) {
        self.state = state;
    }

    pub(crate) fn bind(&mut self, binding: Binding<C>) -> Option<Binding<C>> {
        self.dispatched += 1;
        self.binding.replace(binding)
    }

    pub(crate) fn unbind(&mut self) -> Option<Binding<C>> {
        self.binding.take()
    }

    /// Undo the dispatched count of a bind whose send never happened.
    pub(crate) fn revert_dispatch(&mut self) {
        self.dispatched = self.dispatched.saturating_sub(1);
    }
}
