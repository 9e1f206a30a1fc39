//! Scheduling: worker bookkeeping, the work queue, dispatch and the
//! coordinator that ties them to a [`Transport`].
//!
//! Everything in here is driven from one thread through `&mut self`. Worker
//! output reaches it as [`WorkerEvent`]s on a channel.

mod coordinator;
mod dispatch;
mod handle;
mod queue;
mod registry;
mod stats;
mod transport;

pub use coordinator::Coordinator;
pub use dispatch::{Dispatcher, DrainOutcome};
pub use handle::{Binding, Handler, WorkerHandle, WorkerId, WorkerState};
pub use queue::{QueuedRequest, WorkQueue};
pub use registry::WorkerPool;
pub use stats::{PoolReport, PoolStats, StatsTracker};
pub use transport::{Spawned, Transport, WorkerEvent};
