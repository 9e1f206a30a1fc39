//! The pool coordinator: owns the workers, the queue and the event loop.

use super::dispatch::{Dispatcher, DrainOutcome};
use super::handle::{Handler, WorkerId, WorkerState};
use super::queue::{QueuedRequest, WorkQueue};
use super::registry::WorkerPool;
use super::stats::{PoolStats, StatsTracker};
use super::transport::{Spawned, Transport, WorkerEvent};
use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::version;
use crate::worker::ProcessTransport;
use crossbeam_channel::{Receiver, never, select, tick};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// How long [`Coordinator::run_until_idle`] waits per turn.
const IDLE_TURN: Duration = Duration::from_millis(100);

/// A pool of worker processes fed from one FIFO queue.
///
/// All state lives on the thread that owns the coordinator. Callers drive it
/// with [`turn`](Self::turn) (or the loops built on it); completion handlers
/// run inside those calls.
///
/// `C` is the caller's per-request context, handed back to the handler
/// together with the worker's result.
pub struct Coordinator<C, T: Transport = ProcessTransport> {
    config: PoolConfig,
    pool: WorkerPool<C>,
    queue: WorkQueue<C>,
    dispatcher: Dispatcher,
    stats: StatsTracker,
    transport: T,
    events: Receiver<WorkerEvent>,
    ticker: Receiver<Instant>,
    on_ready: Option<Box<dyn FnOnce()>>,
    ready: bool,
    /// A worker that exited before its handshake; the pool can never be ready.
    lost_at_startup: Option<WorkerId>,
    shut_down: bool,
}

impl<C> Coordinator<C, ProcessTransport> {
    /// Spawn `config.pool_size` worker processes.
    ///
    /// `on_ready` runs once, on the coordinator thread, after the last worker
    /// has sent its handshake. Requests may be submitted before that.
    pub fn start(config: PoolConfig, on_ready: impl FnOnce() + 'static) -> Result<Self> {
        config.validate()?;
        let entry = config.resolved_entry_point()?;
        if !config.silent_start {
            for line in version::banner(config.pool_size, config.trace) {
                info!("{}", line);
            }
        }

        let spawned = ProcessTransport::spawn(&entry, config.pool_size)?;
        Self::with_transport(config, spawned, on_ready)
    }
}

impl<C, T: Transport> Coordinator<C, T> {
    /// Build a coordinator over workers started by some other transport.
    pub fn with_transport(
        config: PoolConfig,
        spawned: Spawned<T>,
        on_ready: impl FnOnce() + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let Spawned {
            transport,
            events,
            workers,
        } = spawned;

        let mut pool = WorkerPool::new();
        for id in workers {
            pool.register(id);
        }
        debug!(workers = pool.len(), "Waiting for worker handshakes");

        Ok(Self {
            ticker: tick(config.monitor_interval),
            dispatcher: Dispatcher::new(config.trace),
            config,
            pool,
            queue: WorkQueue::new(),
            stats: StatsTracker::new(),
            transport,
            events,
            on_ready: Some(Box::new(on_ready)),
            ready: false,
            lost_at_startup: None,
            shut_down: false,
        })
    }

    /// Queue `action` for the next free worker.
    ///
    /// `handler` is called exactly once with `context` and the worker's
    /// result. Dispatch is attempted immediately.
    pub fn submit<F>(&mut self, action: Value, context: C, handler: F) -> Result<()>
    where
        F: FnOnce(C, Value) -> anyhow::Result<()> + 'static,
    {
        let handler: Handler<C> = Box::new(handler);
        let queue_len = self.queue.push_back(QueuedRequest::new(action, context, handler));
        let request_no = self.stats.record_submit(queue_len);
        if self.config.trace {
            debug!(
                queue_len,
                request_no,
                elapsed_s = self.stats.elapsed().as_secs_f64(),
                "Action added to queue"
            );
        }
        self.dispatch()?;
        Ok(())
    }

    /// Wait up to `timeout` for one worker event or monitor tick and process
    /// it. Returns whether anything was processed.
    ///
    /// A failing completion handler is reported here as
    /// [`PoolError::Handler`]; the pool itself stays consistent. Once a
    /// worker has died before its handshake every turn fails with
    /// [`PoolError::Startup`].
    pub fn turn(&mut self, timeout: Duration) -> Result<bool> {
        self.check_startup()?;
        let events = self.events.clone();
        let ticker = self.ticker.clone();
        select! {
            recv(events) -> event => match event {
                Ok(event) => {
                    trace!(worker_id = %event.from(), "Worker event");
                    self.handle_event(event)?;
                    Ok(true)
                }
                Err(_) => {
                    debug!("All worker channels closed");
                    self.events = never();
                    Ok(false)
                }
            },
            recv(ticker) -> _ => {
                self.tick()?;
                Ok(true)
            },
            default(timeout) => Ok(false),
        }
    }

    /// Retry dispatch and, when tracing, log the utilisation report if
    /// anything was dispatched since the last one.
    pub fn tick(&mut self) -> Result<()> {
        self.dispatch()?;
        if self.config.trace
            && let Some(report) = self.stats.take_report(self.pool.dispatch_counts())
        {
            report.log();
        }
        Ok(())
    }

    /// Turn until every worker has sent its handshake.
    pub fn wait_ready(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while !self.ready {
            self.check_startup()?;
            let now = Instant::now();
            if now >= deadline {
                return Err(PoolError::StartupTimeout {
                    waited_ms: timeout.as_millis(),
                    started: self.pool.handshakes(),
                    expected: self.pool.len(),
                });
            }
            self.turn(deadline - now)?;
        }
        Ok(())
    }

    /// Turn until the queue is empty and no request is in flight.
    ///
    /// Requests held by workers that exited never complete and are not
    /// waited for. Fails with [`PoolError::Exhausted`] if work is queued but
    /// no worker is left to run it.
    pub fn run_until_idle(&mut self) -> Result<()> {
        while !self.queue.is_empty() || self.pool.in_flight() > 0 {
            self.check_startup()?;
            if self.live_workers() == 0 {
                return Err(PoolError::Exhausted {
                    queued: self.queue.len(),
                });
            }
            self.turn(IDLE_TURN)?;
        }
        Ok(())
    }

    /// Stop every worker: close its stdin, wait up to `grace`, then signal.
    pub fn shutdown(&mut self, grace: Duration) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        let abandoned = self.queue.len() + self.pool.in_flight();
        if abandoned > 0 {
            warn!(abandoned, "Shutting down with unfinished requests");
        }
        self.transport.shutdown(grace);
        debug!("Worker pool shut down");
    }

    /// Whether every worker has completed its handshake.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Requests dispatched to a live worker and not answered yet.
    pub fn in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot(
            self.queue.len(),
            self.pool.in_flight(),
            self.pool.dispatch_counts(),
            self.pool.stalled(),
        )
    }

    /// Workers that exited with a request in flight.
    pub fn stalled_workers(&self) -> Vec<WorkerId> {
        self.pool.stalled()
    }

    pub fn worker_ids(&self) -> Vec<WorkerId> {
        self.pool.ids()
    }

    pub fn worker_state(&self, id: WorkerId) -> Option<WorkerState> {
        self.pool.get(id).map(|h| h.state())
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn check_startup(&self) -> Result<()> {
        match self.lost_at_startup {
            Some(worker) => Err(PoolError::Startup(format!(
                "worker {} exited before its handshake",
                worker
            ))),
            None => Ok(()),
        }
    }

    fn live_workers(&self) -> usize {
        self.pool
            .handles()
            .filter(|h| h.state() != WorkerState::Exited)
            .count()
    }

    /// Drain the queue into free workers. Nothing leaves the queue before
    /// the whole pool is up.
    fn dispatch(&mut self) -> Result<DrainOutcome> {
        if !self.ready {
            return Ok(DrainOutcome::default());
        }
        let outcome = self.dispatcher.try_dispatch(
            &mut self.queue,
            &mut self.pool,
            &mut self.transport,
            &mut self.stats,
        )?;
        for worker in &outcome.failed {
            self.log_termination(*worker);
        }
        Ok(outcome)
    }

    fn handle_event(&mut self, event: WorkerEvent) -> Result<()> {
        match event {
            WorkerEvent::Reply { from, reply } => {
                if reply.ok != from {
                    return Err(PoolError::Protocol {
                        worker: from,
                        message: format!("reply claims to come from {}", reply.ok),
                    });
                }
                let state = self
                    .pool
                    .get(from)
                    .map(|h| h.state())
                    .ok_or(PoolError::UnknownWorker(from))?;
                if state == WorkerState::AwaitingHandshake {
                    self.on_handshake(from)
                } else {
                    self.on_response(from, reply.into_result())
                }
            }
            WorkerEvent::Malformed { from, line, error } => {
                warn!(worker_id = %from, line, "Ignoring malformed worker output");
                Err(PoolError::Protocol {
                    worker: from,
                    message: format!("malformed reply: {}", error),
                })
            }
            WorkerEvent::Closed { from } => self.on_closed(from),
        }
    }

    fn on_handshake(&mut self, worker: WorkerId) -> Result<()> {
        if !self.pool.complete_handshake(worker)? {
            return Ok(());
        }
        if self.config.trace {
            debug!(worker_id = %worker, "Worker added to available pool");
        }
        if self.pool.handshakes() < self.pool.len() {
            return Ok(());
        }

        self.ready = true;
        if self.config.trace {
            info!(workers = self.pool.len(), "Worker pool is ready");
        }
        self.dispatch()?;
        if let Some(on_ready) = self.on_ready.take() {
            on_ready();
        }
        Ok(())
    }

    fn on_response(&mut self, worker: WorkerId, result: Value) -> Result<()> {
        let binding = self.pool.take_binding(worker)?;
        if let Err(e) = self.pool.release(worker) {
            error!(worker_id = %worker, error = %e, "Response from a worker that was not busy");
            return Err(e);
        }
        if self.config.trace {
            debug!(worker_id = %worker, "Worker added to available pool");
        }

        // The worker is free again before the handler runs.
        self.dispatch()?;

        let Some(binding) = binding else {
            warn!(worker_id = %worker, "Response with no request bound to the worker");
            return Ok(());
        };
        self.stats.record_completion();
        if self.config.trace {
            debug!(worker_id = %worker, "Running handler");
        }
        binding
            .complete(result)
            .map_err(|source| PoolError::Handler { worker, source })
    }

    fn on_closed(&mut self, worker: WorkerId) -> Result<()> {
        let previous = self.pool.mark_exited(worker)?;
        self.log_termination(worker);
        match previous {
            WorkerState::Busy => {
                warn!(worker_id = %worker, "Worker exited with a request in flight");
            }
            WorkerState::AwaitingHandshake if !self.ready => {
                error!(worker_id = %worker, "Worker exited before its handshake");
                self.lost_at_startup = Some(worker);
                return self.check_startup();
            }
            _ => {}
        }
        Ok(())
    }

    fn log_termination(&mut self, worker: WorkerId) {
        if let Some(reason) = self.transport.termination(worker) {
            if reason.is_success() {
                debug!(worker_id = %worker, %reason, "Worker process ended");
            } else {
                warn!(worker_id = %worker, %reason, "Worker process ended");
            }
        }
    }
}

impl<C, T: Transport> Drop for Coordinator<C, T> {
    fn drop(&mut self) {
        let grace = self.config.shutdown_grace;
        self.shutdown(grace);
    }
}
