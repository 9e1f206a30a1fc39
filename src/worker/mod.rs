//! Worker processes and the pipes between them and the coordinator.
//!
//! Each worker is a separate process talking newline-delimited JSON over its
//! stdin/stdout. The coordinator side is [`ProcessTransport`]; the worker
//! side is [`serve`] / [`run_worker_main`].
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────┐
//!                     │   Coordinator   │
//!                     │ (single thread) │
//!                     └────────┬────────┘
//!                              │  stdin: action lines
//!               ┌──────────────┼──────────────┐
//!               │              │              │
//!         ┌─────▼─────┐  ┌─────▼─────┐  ┌─────▼─────┐
//!         │ Worker 1  │  │ Worker 2  │  │ Worker N  │
//!         │ (process) │  │ (process) │  │ (process) │
//!         └─────┬─────┘  └─────┬─────┘  └─────┬─────┘
//!               │  stdout: handshake, responses
//!         collector 1    collector 2    collector N
//! ```
//!
//! # Protocol
//!
//! - Handshake (worker to coordinator), once at startup: `{"ok": <pid>}`
//! - Request (coordinator to worker): the action payload
//! - Response (worker to coordinator): `{"ok": <pid>, "response": <result>}`

mod channel;
pub mod ipc;
mod proc;
pub mod protocol;
pub mod signals;
mod spawn;
pub mod worker_main;

pub use channel::ProcessTransport;
pub use protocol::WorkerReply;
pub use signals::TerminationReason;
pub use worker_main::{builtin_action, run_worker_main, serve};
