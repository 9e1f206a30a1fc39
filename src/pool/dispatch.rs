//! Draining the work queue into free workers.

use super::handle::WorkerId;
use super::queue::{QueuedRequest, WorkQueue};
use super::registry::WorkerPool;
use super::stats::StatsTracker;
use super::transport::Transport;
use crate::error::{PoolError, Result};
use tracing::{debug, warn};

/// Outcome of one [`Dispatcher::try_dispatch`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Workers that received a request, in dispatch order.
    pub dispatched: Vec<WorkerId>,
    /// Workers whose channel failed during send. They are out of the pool.
    pub failed: Vec<WorkerId>,
    /// The pass was skipped because another one was running.
    pub skipped: bool,
}

/// Greedy, non-blocking scheduler.
///
/// Each pass pops the queue head and hands it to any free worker, stopping
/// as soon as the queue is empty or no worker is free. A pass never waits.
#[derive(Debug, Default)]
pub struct Dispatcher {
    draining: bool,
    trace: bool,
}

impl Dispatcher {
    pub fn new(trace: bool) -> Self {
        Self {
            draining: false,
            trace,
        }
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Run one drain pass.
    ///
    /// A call made while a pass is already running returns immediately with
    /// `skipped` set, so the same queue head is never dispatched twice.
    pub fn try_dispatch<C, T: Transport>(
        &mut self,
        queue: &mut WorkQueue<C>,
        pool: &mut WorkerPool<C>,
        transport: &mut T,
        stats: &mut StatsTracker,
    ) -> Result<DrainOutcome> {
        if self.draining {
            return Ok(DrainOutcome {
                skipped: true,
                ..DrainOutcome::default()
            });
        }
        if queue.is_empty() {
            return Ok(DrainOutcome::default());
        }

        self.draining = true;
        let result = self.drain(queue, pool, transport, stats);
        self.draining = false;
        result
    }

    fn drain<C, T: Transport>(
        &mut self,
        queue: &mut WorkQueue<C>,
        pool: &mut WorkerPool<C>,
        transport: &mut T,
        stats: &mut StatsTracker,
    ) -> Result<DrainOutcome> {
        let pass = stats.record_drain_pass();
        if self.trace {
            debug!(
                pass,
                queue_len = queue.len(),
                elapsed_s = stats.elapsed().as_secs_f64(),
                "Processing queue"
            );
        }

        let mut outcome = DrainOutcome::default();
        while let Some(request) = queue.pop_front() {
            let Some(worker) = pool.acquire_free() else {
                queue.push_front(request);
                if self.trace {
                    debug!(queue_len = queue.len(), "Queue processing paused: no free worker");
                }
                return Ok(outcome);
            };

            let (action, binding) = request.into_parts();
            pool.bind(worker, binding)?;

            match transport.send(worker, &action) {
                Ok(()) => {
                    if self.trace {
                        debug!(worker_id = %worker, "Dispatched action");
                    }
                    stats.record_dispatch();
                    outcome.dispatched.push(worker);
                }
                Err(source) => {
                    let err = PoolError::Send { worker, source };
                    warn!(
                        worker_id = %worker,
                        error = ?err,
                        "Removing worker from pool"
                    );
                    if let Some(binding) = pool.unbind_unsent(worker)? {
                        queue.push_front(QueuedRequest::from_parts(action, binding));
                    }
                    pool.mark_exited(worker)?;
                    outcome.failed.push(worker);
                }
            }
        }

        if self.trace {
            debug!("Queue exhausted");
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::handle::Handler;
    use crate::worker::signals::TerminationReason;
    use serde_json::{Value, json};
    use std::collections::HashSet;
    use std::io;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        sent: Vec<(WorkerId, Value)>,
        broken: HashSet<WorkerId>,
    }

    impl Transport for Recorder {
        fn send(&mut self, worker: WorkerId, action: &Value) -> io::Result<()> {
            if self.broken.contains(&worker) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
            }
            self.sent.push((worker, action.clone()));
            Ok(())
        }

        fn termination(&mut self, _worker: WorkerId) -> Option<TerminationReason> {
            None
        }

        fn shutdown(&mut self, _grace: Duration) {}
    }

    fn noop() -> Handler<u32> {
        Box::new(|_, _| Ok(()))
    }

    fn setup(workers: &[u32], requests: u32) -> (WorkQueue<u32>, WorkerPool<u32>) {
        let mut pool = WorkerPool::new();
        for &raw in workers {
            pool.register(WorkerId::new(raw));
            pool.complete_handshake(WorkerId::new(raw)).unwrap();
        }
        let mut queue = WorkQueue::new();
        for n in 0..requests {
            queue.push_back(QueuedRequest::new(json!(n), n, noop()));
        }
        (queue, pool)
    }

    #[test]
    fn test_dispatch_up_to_free_workers() {
        let (mut queue, mut pool) = setup(&[1, 2], 4);
        let mut transport = Recorder::default();
        let mut stats = StatsTracker::new();
        let mut dispatcher = Dispatcher::new(false);

        let outcome = dispatcher
            .try_dispatch(&mut queue, &mut pool, &mut transport, &mut stats)
            .unwrap();

        assert_eq!(outcome.dispatched.len(), 2);
        assert_eq!(queue.len(), 2);
        let sent: Vec<Value> = transport.sent.iter().map(|(_, a)| a.clone()).collect();
        assert_eq!(sent, vec![json!(0), json!(1)]);
        // Remaining requests keep their order.
        let left: Vec<&Value> = queue.actions().collect();
        assert_eq!(left, vec![&json!(2), &json!(3)]);
    }

    #[test]
    fn test_no_free_worker_keeps_queue_intact() {
        let (mut queue, mut pool) = setup(&[], 3);
        let mut transport = Recorder::default();
        let mut stats = StatsTracker::new();
        let mut dispatcher = Dispatcher::new(false);

        let outcome = dispatcher
            .try_dispatch(&mut queue, &mut pool, &mut transport, &mut stats)
            .unwrap();
        assert!(outcome.dispatched.is_empty());
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.actions().next(), Some(&json!(0)));
        assert!(!dispatcher.is_draining());
    }

    #[test]
    fn test_repeated_triggers_do_not_duplicate() {
        let (mut queue, mut pool) = setup(&[1], 1);
        let mut transport = Recorder::default();
        let mut stats = StatsTracker::new();
        let mut dispatcher = Dispatcher::new(false);

        for _ in 0..5 {
            dispatcher
                .try_dispatch(&mut queue, &mut pool, &mut transport, &mut stats)
                .unwrap();
        }
        assert_eq!(transport.sent.len(), 1);
    }

    #[test]
    fn test_reentrant_trigger_is_skipped() {
        let (mut queue, mut pool) = setup(&[1], 1);
        let mut transport = Recorder::default();
        let mut stats = StatsTracker::new();
        let mut dispatcher = Dispatcher::new(false);

        dispatcher.draining = true;
        let outcome = dispatcher
            .try_dispatch(&mut queue, &mut pool, &mut transport, &mut stats)
            .unwrap();
        assert!(outcome.skipped);
        assert!(transport.sent.is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_send_failure_requeues_at_head() {
        let (mut queue, mut pool) = setup(&[1, 2], 2);
        let mut transport = Recorder::default();
        let mut stats = StatsTracker::new();
        let mut dispatcher = Dispatcher::new(false);

        // Cycling a worker through acquire/release sends it to the back of
        // the free list; its pipe is broken.
        let first = pool.acquire_free().unwrap();
        pool.release(first).unwrap();
        transport.broken.insert(first);

        let outcome = dispatcher
            .try_dispatch(&mut queue, &mut pool, &mut transport, &mut stats)
            .unwrap();

        assert_eq!(outcome.failed, vec![first]);
        assert_eq!(outcome.dispatched.len(), 1);
        // Request 0 went to the healthy worker; request 1 hit the broken one
        // and waits at the head again.
        assert_eq!(transport.sent[0].1, json!(0));
        assert_eq!(queue.actions().next(), Some(&json!(1)));
        assert_eq!(pool.get(first).unwrap().dispatched(), 0);
        assert!(pool.stalled().is_empty());
    }
}
