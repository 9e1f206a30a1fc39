//! procpool: run JSON actions on a pool of worker processes.

mod cli;

use anyhow::{Context, Result, bail};
use clap::Parser;
use crossbeam_channel::{Receiver, TryRecvError, unbounded};
use owo_colors::{OwoColorize, Stream::Stderr};
use procpool::Coordinator;
use procpool::logging::{self, LogConfig};
use procpool::worker::ipc::LineWriter;
use procpool::worker::{builtin_action, run_worker_main};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::io::{self, BufRead};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

use cli::{Cli, Commands, RunArgs, Verbosity};

/// How long the run loop waits for worker events between stdin polls.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }

    let result = match &cli.command {
        Commands::Run(args) => {
            init_logging(&cli, LogConfig::for_coordinator());
            cmd_run(args)
        }
        Commands::Worker(args) => {
            init_logging(&cli, LogConfig::for_worker());
            run_worker_main(builtin_action(Duration::from_millis(args.delay_ms)))
        }
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

/// Apply CLI flags on top of a logging preset. `-v`/`-q` beat the
/// environment, `--log-format` beats `PROCPOOL_LOG_FORMAT`.
fn init_logging(cli: &Cli, preset: LogConfig) {
    let mut config = preset.with_ansi(!cli.no_color);
    if let Some(filter) = cli.log_filter() {
        config = config.with_filter(filter);
    }
    config = config.with_env_overrides();
    if let Some(format) = cli.log_format {
        config = config.with_format(format.into());
    }
    if cli.verbosity() == Verbosity::Trace {
        config = config.with_thread_names(true);
    }
    logging::init(config);
}

/// Lines read from stdin on a separate thread, so the pool keeps turning
/// while input is pending.
fn spawn_stdin_reader() -> Result<Receiver<io::Result<String>>> {
    let (tx, rx) = unbounded();
    std::thread::Builder::new()
        .name("procpool-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        })
        .context("Failed to spawn stdin reader")?;
    Ok(rx)
}

fn parse_action(line: &str, line_no: u64) -> Result<Option<Value>> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    let action = serde_json::from_str(line)
        .with_context(|| format!("Invalid JSON action on line {}", line_no))?;
    Ok(Some(action))
}

fn cmd_run(args: &RunArgs) -> Result<()> {
    let config = args.pool_config()?;
    let grace = config.shutdown_grace;

    let mut pool: Coordinator<u64> =
        Coordinator::start(config, || info!("Worker pool started"))?;
    pool.wait_ready(Duration::from_secs(args.startup_timeout))?;

    let out = Rc::new(RefCell::new(LineWriter::new(io::stdout().lock())));
    let input = spawn_stdin_reader()?;
    let mut line_no = 0u64;

    loop {
        match input.try_recv() {
            Ok(line) => {
                let line = line.context("Failed to read stdin")?;
                line_no += 1;
                let Some(action) = parse_action(&line, line_no)? else {
                    continue;
                };
                let out = Rc::clone(&out);
                pool.submit(action, line_no, move |request, result| {
                    out.borrow_mut()
                        .write_json(&json!({"request": request, "result": result}))?;
                    Ok(())
                })?;
                // Busy input must not starve replies.
                while pool.turn(Duration::ZERO)? {}
            }
            Err(TryRecvError::Empty) => {
                pool.turn(POLL_INTERVAL)?;
            }
            Err(TryRecvError::Disconnected) => break,
        }
    }

    debug!(requests = line_no, "Input closed, waiting for outstanding requests");
    pool.run_until_idle()?;

    let stats = pool.stats();
    let stalled = pool.stalled_workers();
    pool.shutdown(grace);

    info!(
        completed = stats.total_completed,
        uptime_ms = stats.uptime_ms,
        "All requests processed"
    );
    if !stalled.is_empty() {
        warn!(?stalled, "Workers exited with requests in flight");
        bail!(
            "{} request(s) lost: worker(s) exited while busy",
            stalled.len()
        );
    }
    Ok(())
}
