//! FIFO of requests waiting for a free worker.

use super::handle::{Binding, Handler};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;

/// A submitted request that has not been dispatched yet.
pub struct QueuedRequest<C> {
    /// Payload sent to the worker.
    pub action: Value,
    /// Caller data returned to the handler untouched.
    pub context: C,
    pub handler: Handler<C>,
}

impl<C> QueuedRequest<C> {
    pub fn new(action: Value, context: C, handler: Handler<C>) -> Self {
        Self {
            action,
            context,
            handler,
        }
    }

    /// Split into the wire payload and the part that stays on this side.
    pub fn into_parts(self) -> (Value, Binding<C>) {
        (self.action, Binding::new(self.context, self.handler))
    }

    /// Reassemble a request whose dispatch had to be undone.
    pub fn from_parts(action: Value, binding: Binding<C>) -> Self {
        Self::new(action, binding.context, binding.handler)
    }
}

impl<C> fmt::Debug for QueuedRequest<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedRequest")
            .field("action", &self.action)
            .finish_non_exhaustive()
    }
}

/// Unbounded FIFO work queue.
///
/// Requests leave in submission order. A request popped for dispatch that
/// finds no free worker goes back to the front with
/// [`push_front`](Self::push_front).
#[derive(Debug)]
pub struct WorkQueue<C> {
    items: VecDeque<QueuedRequest<C>>,
}

impl<C> Default for WorkQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> WorkQueue<C> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Append a request. Returns the new queue length.
    pub fn push_back(&mut self, request: QueuedRequest<C>) -> usize {
        self.items.push_back(request);
        self.items.len()
    }

    pub fn push_front(&mut self, request: QueuedRequest<C>) {
        self.items.push_front(request);
    }

    pub fn pop_front(&mut self) -> Option<QueuedRequest<C>> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Actions currently queued, head first.
    pub fn actions(&self) -> impl Iterator<Item = &Value> {
        self.items.iter().map(|r| &r.action)
    }
}
