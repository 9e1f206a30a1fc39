//! A fixed-size pool of worker processes fed from one FIFO queue.
//!
//! Submit JSON actions to a [`Coordinator`]; each is sent to a free worker
//! process, and the completion handler registered with it runs once the
//! worker answers. Worker programs are built around
//! [`worker::run_worker_main`].
//!
//! ```no_run
//! use procpool::{Coordinator, PoolConfig};
//! use serde_json::json;
//! use std::time::Duration;
//!
//! # fn main() -> procpool::Result<()> {
//! let mut pool = Coordinator::start(PoolConfig::new().with_pool_size(2), || {})?;
//! pool.wait_ready(Duration::from_secs(10))?;
//! pool.submit(json!({"x": 1}), "first", |ctx, result| {
//!     println!("{ctx}: {result}");
//!     Ok(())
//! })?;
//! pool.run_until_idle()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod pool;
pub mod version;
pub mod worker;

pub use config::{PoolConfig, WorkerEntryPoint};
pub use error::{PoolError, Result};
pub use pool::{Coordinator, PoolStats, WorkerId};
