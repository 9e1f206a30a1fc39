//! Wire format between the coordinator and its workers.
//!
//! Every message is one JSON document on its own line.
//!
//! - worker -> coordinator, once at startup: `{"ok": <pid>}`
//! - coordinator -> worker: the action payload, as is
//! - worker -> coordinator, per action: `{"ok": <pid>, "response": <result>}`
//!
//! The handshake and a response differ only in the presence of `response`.
//! The coordinator tells them apart by what it expects from that worker, so
//! a result of `null` is still a result.

use crate::pool::WorkerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message from worker to coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReply {
    /// The sending worker's id.
    pub ok: WorkerId,
    /// Result of the action; absent on the handshake.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

impl WorkerReply {
    /// The startup handshake.
    pub fn handshake(worker: WorkerId) -> Self {
        Self {
            ok: worker,
            response: None,
        }
    }

    /// The answer to one action.
    pub fn response(worker: WorkerId, result: Value) -> Self {
        Self {
            ok: worker,
            response: Some(result),
        }
    }

    /// The result carried by this message, `null` if there is none.
    pub fn into_result(self) -> Value {
        self.response.unwrap_or(Value::Null)
    }

    /// Deserialize from JSON line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

/// Serialize an action payload to a JSON line (with newline).
pub fn action_line(action: &Value) -> String {
    let mut json = action.to_string();
    json.push('\n');
    json
}

/// Result a worker sends back for a line it could not decode as an action.
pub fn invalid_action(error: &serde_json::Error) -> Value {
    serde_json::json!({ "error": format!("invalid action: {}", error) })
}
