//! Pool configuration.

use crate::error::{PoolError, Result};
use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;

/// Subcommand of the procpool binary that runs the built-in worker.
pub const BUILTIN_WORKER_SUBCOMMAND: &str = "worker";

/// Default number of worker processes.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Default interval between dispatch retries and utilisation reports.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_millis(30_000);

/// Program a worker process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEntryPoint {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Extra environment variables for the worker.
    pub env: Vec<(String, String)>,
}

impl WorkerEntryPoint {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// The built-in worker: this executable's hidden `worker` subcommand.
    pub fn builtin() -> Result<Self> {
        let exe = std::env::current_exe().map_err(|e| {
            PoolError::Config(format!("cannot locate the current executable: {}", e))
        })?;
        Ok(Self::new(exe).with_args([BUILTIN_WORKER_SUBCOMMAND]))
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_string_lossy().into_owned()));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

/// Configuration for a [`Coordinator`](crate::Coordinator).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker processes.
    pub pool_size: usize,
    /// Program each worker runs; `None` means the built-in worker.
    pub entry_point: Option<WorkerEntryPoint>,
    /// Period of the dispatch retry tick and the utilisation report.
    pub monitor_interval: Duration,
    /// Log queue and dispatch activity and the periodic report.
    pub trace: bool,
    /// Skip the startup banner.
    pub silent_start: bool,
    /// How long `shutdown` waits for a worker to exit after closing its stdin.
    pub shutdown_grace: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            entry_point: None,
            monitor_interval: DEFAULT_MONITOR_INTERVAL,
            trace: true,
            silent_start: false,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_entry_point(mut self, entry_point: WorkerEntryPoint) -> Self {
        self.entry_point = Some(entry_point);
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_silent_start(mut self, silent: bool) -> Self {
        self.silent_start = silent;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Check the configuration for values the pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(PoolError::Config("pool_size must be at least 1".into()));
        }
        if self.monitor_interval.is_zero() {
            return Err(PoolError::Config(
                "monitor_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// The entry point workers are spawned with.
    pub fn resolved_entry_point(&self) -> Result<WorkerEntryPoint> {
        match &self.entry_point {
            Some(entry) => Ok(entry.clone()),
            None => WorkerEntryPoint::builtin(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.monitor_interval, Duration::from_secs(30));
        assert!(config.trace);
        assert!(!config.silent_start);
        assert!(config.entry_point.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PoolConfig::new()
            .with_pool_size(2)
            .with_monitor_interval(Duration::from_millis(250))
            .with_trace(false)
            .with_silent_start(true)
            .with_entry_point(WorkerEntryPoint::new("/usr/bin/my-worker").with_args(["--fast"]));

        assert_eq!(config.pool_size, 2);
        assert_eq!(config.monitor_interval, Duration::from_millis(250));
        assert!(!config.trace);
        assert!(config.silent_start);
        let entry = config.resolved_entry_point().unwrap();
        assert_eq!(entry.program, PathBuf::from("/usr/bin/my-worker"));
        assert_eq!(entry.args, vec!["--fast"]);
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let err = PoolConfig::new().with_pool_size(0).validate().unwrap_err();
        assert!(err.to_string().contains("pool_size"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = PoolConfig::new()
            .with_monitor_interval(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("monitor_interval"));
    }

    #[test]
    fn test_builtin_entry_point_runs_worker_subcommand() {
        let entry = WorkerEntryPoint::builtin().unwrap();
        assert_eq!(entry.args, vec![BUILTIN_WORKER_SUBCOMMAND]);
        assert_eq!(entry.program, std::env::current_exe().unwrap());
    }
}
