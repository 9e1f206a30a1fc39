//! Logging setup shared by the coordinator and worker processes.
//!
//! All output goes to stderr (and optionally a file). A worker's stdout is
//! its protocol channel, so nothing may log there.
//!
//! # Environment Variables
//!
//! - `PROCPOOL_LOG` - Log filter (overrides RUST_LOG)
//! - `PROCPOOL_LOG_LEVEL` - Log level: error, warn, info, debug, trace
//! - `PROCPOOL_LOG_FORMAT` - Output format: pretty, compact, json
//! - `PROCPOOL_LOG_FILE` - Path to log file (in addition to stderr)
//! - `RUST_LOG` - Standard Rust log filter (fallback)
//!
//! # Example
//!
//! ```no_run
//! use procpool::logging::{LogConfig, init};
//!
//! init(LogConfig::for_coordinator().with_env_overrides());
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-field format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON, one object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "full" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(format!(
                "Unknown log format: '{}'. Valid options: pretty, compact, json",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Log rotation for file output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    /// Single file, never rotated
    Never,
}

impl FromStr for LogRotation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "never" => Ok(Self::Never),
            _ => Err(format!(
                "Unknown log rotation: '{}'. Valid options: hourly, daily, never",
                s
            )),
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
            LogRotation::Never => Rotation::NEVER,
        }
    }
}

/// Logging configuration.
///
/// Use the builder methods to customize, then pass to [`init`].
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Base log level (default: INFO)
    pub level: Level,
    pub format: LogFormat,
    /// Path to log file (None = stderr only)
    pub file_path: Option<PathBuf>,
    pub rotation: LogRotation,
    /// Custom filter string (overrides level if set)
    pub filter: Option<String>,
    /// ANSI colours on stderr
    pub ansi: bool,
    pub show_target: bool,
    pub show_thread_names: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            file_path: None,
            rotation: LogRotation::Daily,
            filter: None,
            ansi: true,
            show_target: true,
            show_thread_names: false,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for the coordinator process.
    pub fn for_coordinator() -> Self {
        Self::default()
    }

    /// Preset for worker processes: compact lines without colour, since
    /// their stderr is interleaved into the coordinator's terminal.
    pub fn for_worker() -> Self {
        Self {
            format: LogFormat::Compact,
            level: Level::WARN,
            ansi: false,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file(mut self, path: PathBuf) -> Self {
        self.file_path = Some(path);
        self
    }

    pub fn with_rotation(mut self, rotation: LogRotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_filter(mut self, filter: String) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    pub fn with_thread_names(mut self, enabled: bool) -> Self {
        self.show_thread_names = enabled;
        self
    }

    /// Apply environment variable overrides.
    ///
    /// A filter already set (from `-v`/`-q`) wins over `PROCPOOL_LOG`,
    /// `RUST_LOG` and `PROCPOOL_LOG_LEVEL`.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    fn with_overrides_from(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if self.filter.is_none() {
            self.filter = var("PROCPOOL_LOG").or_else(|| var("RUST_LOG"));
        }

        if self.filter.is_none()
            && let Some(level) = var("PROCPOOL_LOG_LEVEL").as_deref().and_then(parse_level)
        {
            self.level = level;
        }

        if let Some(format) = var("PROCPOOL_LOG_FORMAT")
            && let Ok(f) = format.parse()
        {
            self.format = f;
        }

        if let Some(path) = var("PROCPOOL_LOG_FILE") {
            self.file_path = Some(PathBuf::from(path));
        }

        self
    }

    fn build_filter(&self) -> EnvFilter {
        let default = || EnvFilter::new(self.level.to_string().to_lowercase());
        match self.filter {
            Some(ref filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| {
                eprintln!("Warning: Invalid log filter '{}', using default", filter);
                default()
            }),
            None => default(),
        }
    }

    /// Open the log file appender, if a file is configured.
    pub fn file_writer(&self) -> Option<RollingFileAppender> {
        self.file_path.as_ref().map(|path| {
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("procpool.log");
            RollingFileAppender::new(self.rotation.into(), parent, file_name)
        })
    }

    fn layer<W>(&self, writer: W, ansi: bool) -> BoxedLayer
    where
        W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
    {
        let base = fmt::layer()
            .with_target(self.show_target)
            .with_thread_names(self.show_thread_names)
            .with_ansi(ansi)
            .with_writer(writer);
        match self.format {
            LogFormat::Json => base.json().boxed(),
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Pretty => base.boxed(),
        }
    }
}

/// Parse a log level string.
fn parse_level(s: &str) -> Option<Level> {
    match s.to_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}

/// Initialize the global tracing subscriber.
///
/// Call once at program startup; later calls are ignored.
pub fn init(config: LogConfig) {
    let mut layers = vec![config.layer(std::io::stderr, config.ansi)];
    if let Some(appender) = config.file_writer() {
        layers.push(config.layer(appender, false));
    }

    let _ = tracing_subscriber::registry()
        .with(layers)
        .with(config.build_filter())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("invalid".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_rotation_from_str() {
        assert_eq!("hourly".parse::<LogRotation>().unwrap(), LogRotation::Hourly);
        assert_eq!("never".parse::<LogRotation>().unwrap(), LogRotation::Never);
        assert!("weekly".parse::<LogRotation>().is_err());
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("warning"), Some(Level::WARN));
        assert_eq!(parse_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_level("loud"), None);
    }

    #[test]
    fn test_worker_preset() {
        let config = LogConfig::for_worker();
        assert_eq!(config.format, LogFormat::Compact);
        assert_eq!(config.level, Level::WARN);
        assert!(!config.ansi);
    }

    #[test]
    fn test_procpool_log_wins_over_rust_log() {
        let config = LogConfig::new().with_overrides_from(env(&[
            ("PROCPOOL_LOG", "procpool=debug"),
            ("RUST_LOG", "warn"),
        ]));
        assert_eq!(config.filter.as_deref(), Some("procpool=debug"));
    }

    #[test]
    fn test_cli_filter_wins_over_env() {
        let config = LogConfig::new()
            .with_filter("trace".into())
            .with_overrides_from(env(&[("PROCPOOL_LOG", "error"), ("PROCPOOL_LOG_LEVEL", "debug")]));
        assert_eq!(config.filter.as_deref(), Some("trace"));
        assert_eq!(config.level, Level::INFO);
    }

    #[test]
    fn test_format_and_file_overrides() {
        let config = LogConfig::new().with_overrides_from(env(&[
            ("PROCPOOL_LOG_FORMAT", "json"),
            ("PROCPOOL_LOG_FILE", "/tmp/procpool-test.log"),
            ("PROCPOOL_LOG_LEVEL", "debug"),
        ]));
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, Level::DEBUG);
        assert_eq!(config.file_path, Some(PathBuf::from("/tmp/procpool-test.log")));
    }

    #[test]
    fn test_unknown_format_is_ignored() {
        let config = LogConfig::new()
            .with_format(LogFormat::Compact)
            .with_overrides_from(env(&[("PROCPOOL_LOG_FORMAT", "xml")]));
        assert_eq!(config.format, LogFormat::Compact);
    }

    #[test]
    fn test_file_writer_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.log");
        let config = LogConfig::new()
            .with_file(path.clone())
            .with_rotation(LogRotation::Never);

        let mut writer = config.file_writer().unwrap();
        writer.write_all(b"worker 1 ready\n").unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "worker 1 ready\n");
    }

    #[test]
    fn test_no_file_writer_by_default() {
        assert!(LogConfig::default().file_writer().is_none());
    }
}
