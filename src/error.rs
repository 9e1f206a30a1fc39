//! Error types for procpool.

use crate::pool::WorkerId;
use thiserror::Error;

/// Main error type for procpool.
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Failed to start worker pool: {0}")]
    Startup(String),

    #[error("Worker pool not ready after {waited_ms}ms ({started} of {expected} workers started)")]
    StartupTimeout {
        waited_ms: u128,
        started: usize,
        expected: usize,
    },

    #[error("Every worker has exited with {queued} requests still queued")]
    Exhausted { queued: usize },

    #[error("Invalid pool configuration: {0}")]
    Config(String),

    #[error("Worker {0} released while already available")]
    DoubleRelease(WorkerId),

    #[error("Unknown worker {0}")]
    UnknownWorker(WorkerId),

    #[error("Protocol violation from worker {worker}: {message}")]
    Protocol { worker: WorkerId, message: String },

    #[error("Failed to send action to worker {worker}")]
    Send {
        worker: WorkerId,
        #[source]
        source: std::io::Error,
    },

    #[error("Completion handler failed for a result from worker {worker}")]
    Handler {
        worker: WorkerId,
        #[source]
        source: anyhow::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for procpool operations.
pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_double_release_names_worker() {
        let err = PoolError::DoubleRelease(WorkerId::new(4242));
        let msg = err.to_string();
        assert!(msg.contains("4242"));
        assert!(msg.contains("already available"));
    }

    #[test]
    fn test_startup_timeout_message() {
        let err = PoolError::StartupTimeout {
            waited_ms: 1500,
            started: 2,
            expected: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("1500ms"));
        assert!(msg.contains("2 of 5"));
    }

    #[test]
    fn test_exhausted_message() {
        let err = PoolError::Exhausted { queued: 3 };
        assert_eq!(err.to_string(), "Every worker has exited with 3 requests still queued");
    }

    #[test]
    fn test_protocol_error_message() {
        let err = PoolError::Protocol {
            worker: WorkerId::new(7),
            message: "reply claims to come from 8".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("worker 7"));
        assert!(msg.contains("claims to come from 8"));
    }

    #[test]
    fn test_handler_error_keeps_cause() {
        let err = PoolError::Handler {
            worker: WorkerId::new(11),
            source: anyhow::anyhow!("client hung up"),
        };
        assert!(err.to_string().contains("worker 11"));
        let cause = err.source().expect("handler error should carry its cause");
        assert_eq!(cause.to_string(), "client hung up");
    }

    #[test]
    fn test_send_error_keeps_io_cause() {
        let err = PoolError::Send {
            worker: WorkerId::new(3),
            source: io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"),
        };
        let cause = err.source().expect("send error should carry its cause");
        assert!(cause.to_string().contains("pipe closed"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "no such worker binary");
        let err: PoolError = io_err.into();
        assert!(err.to_string().contains("no such worker binary"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let err: PoolError = json_err.into();
        assert!(err.to_string().contains("JSON"));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_err() -> Result<()> {
            Err(PoolError::Config("pool_size must be at least 1".into()))
        }
        assert!(returns_err().is_err());
    }
}
