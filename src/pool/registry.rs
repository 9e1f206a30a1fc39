//! The set of worker handles and their availability.

use super::handle::{Binding, WorkerHandle, WorkerId, WorkerState};
use crate::error::{PoolError, Result};
use std::collections::{BTreeMap, VecDeque};

/// Owns every [`WorkerHandle`] and the free list used for acquisition.
///
/// The free list holds exactly the ids of handles in
/// [`WorkerState::Available`], so acquiring a worker is O(1).
#[derive(Debug)]
pub struct WorkerPool<C> {
    handles: BTreeMap<WorkerId, WorkerHandle<C>>,
    free: VecDeque<WorkerId>,
    handshakes: usize,
}

impl<C> Default for WorkerPool<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> WorkerPool<C> {
    pub fn new() -> Self {
        Self {
            handles: BTreeMap::new(),
            free: VecDeque::new(),
            handshakes: 0,
        }
    }

    /// Register a freshly spawned worker. It is not eligible for work until
    /// its handshake arrives.
    pub fn register(&mut self, id: WorkerId) {
        self.handles.entry(id).or_insert_with(|| WorkerHandle::new(id));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of distinct workers whose handshake has been received.
    pub fn handshakes(&self) -> usize {
        self.handshakes
    }

    /// Number of workers currently free.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn get(&self, id: WorkerId) -> Option<&WorkerHandle<C>> {
        self.handles.get(&id)
    }

    pub fn handles(&self) -> impl Iterator<Item = &WorkerHandle<C>> {
        self.handles.values()
    }

    pub fn ids(&self) -> Vec<WorkerId> {
        self.handles.keys().copied().collect()
    }

    fn handle_mut(&mut self, id: WorkerId) -> Result<&mut WorkerHandle<C>> {
        self.handles
            .get_mut(&id)
            .ok_or(PoolError::UnknownWorker(id))
    }

    /// Record a worker's startup handshake.
    ///
    /// Returns `true` the first time a worker shakes hands; the worker then
    /// becomes available. Returns `false` if the worker was already past its
    /// handshake, leaving its state untouched.
    pub fn complete_handshake(&mut self, id: WorkerId) -> Result<bool> {
        let handle = self.handle_mut(id)?;
        if handle.state() != WorkerState::AwaitingHandshake {
            return Ok(false);
        }
        handle.set_state(WorkerState::Available);
        self.free.push_back(id);
        self.handshakes += 1;
        Ok(true)
    }

    /// Take any free worker and mark it busy.
    ///
    /// Which free worker is returned is unspecified.
    pub fn acquire_free(&mut self) -> Option<WorkerId> {
        while let Some(id) = self.free.pop_front() {
            // Entries of workers that exited while free are stale.
            if let Some(handle) = self.handles.get_mut(&id)
                && handle.state() == WorkerState::Available
            {
                handle.set_state(WorkerState::Busy);
                return Some(id);
            }
        }
        None
    }

    /// Mark a busy worker available again.
    pub fn release(&mut self, id: WorkerId) -> Result<()> {
        let handle = self.handle_mut(id)?;
        match handle.state() {
            WorkerState::Busy => {
                handle.set_state(WorkerState::Available);
                self.free.push_back(id);
                Ok(())
            }
            WorkerState::Available => Err(PoolError::DoubleRelease(id)),
            state => Err(PoolError::Protocol {
                worker: id,
                message: format!("cannot release a worker that is {}", state),
            }),
        }
    }

    /// Attach an in-flight request to a worker acquired with
    /// [`acquire_free`](Self::acquire_free).
    pub fn bind(&mut self, id: WorkerId, binding: Binding<C>) -> Result<()> {
        let handle = self.handle_mut(id)?;
        if handle.state() != WorkerState::Busy || handle.has_binding() {
            return Err(PoolError::Protocol {
                worker: id,
                message: format!("cannot bind a request to a worker that is {}", handle.state()),
            });
        }
        handle.bind(binding);
        Ok(())
    }

    /// Detach and return the in-flight request of a worker, if any.
    pub fn take_binding(&mut self, id: WorkerId) -> Result<Option<Binding<C>>> {
        Ok(self.handle_mut(id)?.unbind())
    }

    /// Undo a [`bind`](Self::bind) whose payload never reached the worker.
    pub(crate) fn unbind_unsent(&mut self, id: WorkerId) -> Result<Option<Binding<C>>> {
        let handle = self.handle_mut(id)?;
        let binding = handle.unbind();
        if binding.is_some() {
            handle.revert_dispatch();
        }
        Ok(binding)
    }

    /// Move a worker to its terminal state. A binding it holds stays in place.
    ///
    /// Returns the state the worker was in.
    pub fn mark_exited(&mut self, id: WorkerId) -> Result<WorkerState> {
        let handle = self.handle_mut(id)?;
        let previous = handle.state();
        handle.set_state(WorkerState::Exited);
        if previous == WorkerState::Available {
            self.free.retain(|free| *free != id);
        }
        Ok(previous)
    }

    /// Number of workers with a request in flight.
    pub fn in_flight(&self) -> usize {
        self.handles
            .values()
            .filter(|h| h.state() == WorkerState::Busy && h.has_binding())
            .count()
    }

    /// Workers that exited while holding a request.
    pub fn stalled(&self) -> Vec<WorkerId> {
        self.handles
            .values()
            .filter(|h| h.state() == WorkerState::Exited && h.has_binding())
            .map(|h| h.id())
            .collect()
    }

    /// Dispatch count per worker.
    pub fn dispatch_counts(&self) -> BTreeMap<WorkerId, u64> {
        self.handles
            .values()
            .map(|h| (h.id(), h.dispatched()))
            .collect()
    }
}
