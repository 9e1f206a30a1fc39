//! Command-line interface definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use procpool::config::{BUILTIN_WORKER_SUBCOMMAND, DEFAULT_POOL_SIZE, WorkerEntryPoint};
use procpool::logging::LogFormat;
use procpool::{PoolConfig, version};
use std::path::PathBuf;
use std::time::Duration;

/// Run JSON actions on a pool of worker processes.
#[derive(Parser, Debug)]
#[command(name = "procpool")]
#[command(author, version = version::PKG_VERSION, long_version = version::long_version(), about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormatArg>,

    /// Disable colored output.
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read actions from stdin, one JSON document per line, and print each
    /// result as it completes.
    Run(RunArgs),

    /// Run the built-in worker on stdin/stdout (spawned by `run`).
    #[command(name = BUILTIN_WORKER_SUBCOMMAND, hide = true)]
    Worker(WorkerArgs),
}

/// Arguments for the run command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Number of worker processes.
    #[arg(short = 'n', long, env = "PROCPOOL_POOL_SIZE", default_value_t = DEFAULT_POOL_SIZE)]
    pub pool_size: usize,

    /// Worker program to spawn instead of the built-in worker.
    #[arg(long, env = "PROCPOOL_WORKER")]
    pub worker: Option<PathBuf>,

    /// Argument passed to the worker program (repeatable).
    #[arg(long = "worker-arg", requires = "worker", allow_hyphen_values = true)]
    pub worker_args: Vec<String>,

    /// Delay of the built-in worker per action, in milliseconds.
    #[arg(long, default_value_t = 0, conflicts_with = "worker")]
    pub worker_delay_ms: u64,

    /// Interval between dispatch retries and utilisation reports.
    #[arg(long, env = "PROCPOOL_MONITOR_INTERVAL_MS", default_value_t = 30_000)]
    pub monitor_interval_ms: u64,

    /// Seconds to wait for every worker's handshake.
    #[arg(long, default_value_t = 30)]
    pub startup_timeout: u64,

    /// Turn off queue and dispatch tracing and the utilisation report.
    #[arg(long)]
    pub no_trace: bool,

    /// Don't log the startup banner.
    #[arg(long)]
    pub silent_start: bool,
}

impl RunArgs {
    /// Pool configuration for these arguments.
    pub fn pool_config(&self) -> procpool::Result<PoolConfig> {
        let delay = self.worker_delay_ms.to_string();
        let entry = match &self.worker {
            Some(program) => WorkerEntryPoint::new(program).with_args(&self.worker_args),
            None => WorkerEntryPoint::builtin()?.with_args(["--delay-ms", delay.as_str()]),
        };
        let config = PoolConfig::new()
            .with_pool_size(self.pool_size)
            .with_entry_point(entry)
            .with_monitor_interval(Duration::from_millis(self.monitor_interval_ms))
            .with_trace(!self.no_trace)
            .with_silent_start(self.silent_start);
        config.validate()?;
        Ok(config)
    }
}

/// Arguments for the built-in worker.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Milliseconds to spend on each action.
    #[arg(long, default_value_t = 0)]
    pub delay_ms: u64,
}

/// Log format choices for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Verbosity level for output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// -q: errors only.
    Quiet,
    /// Default: banner, readiness and utilisation reports.
    Normal,
    /// -v: queue and dispatch activity.
    Debug,
    /// -vv: every line exchanged with workers.
    Trace,
}

impl Cli {
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            return Verbosity::Quiet;
        }
        match self.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Debug,
            _ => Verbosity::Trace,
        }
    }

    /// Log filter implied by `-v`/`-q`, if any.
    pub fn log_filter(&self) -> Option<String> {
        match self.verbosity() {
            Verbosity::Quiet => Some("error".to_string()),
            Verbosity::Normal => None,
            Verbosity::Debug => Some("procpool=debug".to_string()),
            Verbosity::Trace => Some("procpool=trace".to_string()),
        }
    }
}
