//! Wire message model and text codec.
//!
//! Every frame exchanged with the peer is a JSON object. Three shapes exist
//! on the wire:
//!
//! | Direction | Shape | Fields |
//! |---|---|---|
//! | client → server | Request | `class`, `cmd`, `tid`, `data?` |
//! | server → client | Response | `result` (`"ok"` / `"error"`), `tid`, `data?` |
//! | either | Ack | `ack` = tid |
//!
//! A Request whose class is `core` and whose command is `ping` is surfaced
//! as [`WireMessage::Ping`] so the dispatcher can answer it without
//! consulting the service handler.
//!
//! `data` is an ordered key → value mapping. Nested values are carried as
//! opaque [`serde_json::Value`]s and round-trip exactly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod codec;

pub use codec::{JsonCodec, WireCodec};

/// Ordered key → value payload carried in the `data` field.
pub type Payload = serde_json::Map<String, Value>;

/// Identifier of one in-flight call within a session.
pub type TransactionId = u64;

/// Class used for protocol-level commands (`login`, `ping`).
pub const CORE_CLASS: &str = "core";

/// Command that is always answered with an empty ok Response.
pub const PING_COMMAND: &str = "ping";

/// Command issued by the login helper.
pub const LOGIN_COMMAND: &str = "login";

/// Wire format error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// The frame could not be rendered as text.
    #[error("encode failed: {message}")]
    Encode {
        /// Details about the encoding failure.
        message: String,
    },

    /// The inbound text is not valid JSON.
    #[error("malformed frame: {message}")]
    Decode {
        /// Details reported by the parser.
        message: String,
    },

    /// The inbound text is valid JSON but not a recognized frame shape.
    #[error("protocol violation: {message}")]
    ProtocolViolation {
        /// What was wrong with the frame.
        message: String,
    },
}

/// Outcome of a terminal Response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The request succeeded; `data` carries the reply.
    Ok,
    /// The request failed; `data` carries `{code, error}`.
    Error,
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum WireMessage {
    /// A request issued by either side.
    Request {
        /// Service class, e.g. `core`.
        class: String,
        /// Command within the class.
        command: String,
        /// Transaction id chosen by the issuer.
        transaction_id: TransactionId,
        /// Request arguments; empty when `data` was absent.
        payload: Payload,
    },

    /// Terminal answer to a request.
    Response {
        /// Transaction id of the request being answered.
        transaction_id: TransactionId,
        /// Success or failure.
        outcome: Outcome,
        /// Reply payload; empty when `data` was absent.
        payload: Payload,
    },

    /// The request is being processed; the deadline is extended.
    Ack {
        /// Transaction id of the request being acknowledged.
        transaction_id: TransactionId,
    },

    /// `core`/`ping` request.
    Ping {
        /// Transaction id chosen by the issuer.
        transaction_id: TransactionId,
    },
}

impl WireMessage {
    /// Transaction id carried by any frame shape.
    pub fn transaction_id(&self) -> TransactionId {
        match self {
            WireMessage::Request { transaction_id, .. }
            | WireMessage::Response { transaction_id, .. }
            | WireMessage::Ack { transaction_id }
            | WireMessage::Ping { transaction_id } => *transaction_id,
        }
    }

    /// Build an ok Response.
    pub fn ok(transaction_id: TransactionId, payload: Payload) -> Self {
        WireMessage::Response {
            transaction_id,
            outcome: Outcome::Ok,
            payload,
        }
    }

    /// Build an error Response carrying `{code, error}`.
    pub fn error(transaction_id: TransactionId, error: &RemoteError) -> Self {
        WireMessage::Response {
            transaction_id,
            outcome: Outcome::Error,
            payload: error.to_payload(),
        }
    }

    /// Short name of the frame shape, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::Request { .. } => "request",
            WireMessage::Response { .. } => "response",
            WireMessage::Ack { .. } => "ack",
            WireMessage::Ping { .. } => "ping",
        }
    }
}

/// Structured error carried in an error Response.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteError {
    /// Numeric error code; 0 when the peer sent none.
    pub code: i64,
    /// Human readable message; empty when the peer sent none.
    pub message: String,
}

impl RemoteError {
    /// Create a remote error.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Extract `{code, message}` from an error Response payload.
    ///
    /// The text is read from `error`, falling back to `message`. Missing or
    /// mistyped fields take their defaults.
    pub fn from_payload(payload: &Payload) -> Self {
        let code = payload.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = payload
            .get("error")
            .or_else(|| payload.get("message"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self { code, message }
    }

    /// Render as the `data` of an error Response.
    pub fn to_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("code".to_string(), Value::from(self.code));
        payload.insert("error".to_string(), Value::from(self.message.clone()));
        payload
    }
}

impl From<i64> for RemoteError {
    fn from(code: i64) -> Self {
        Self {
            code,
            message: String::new(),
        }
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.message.is_empty() {
            write!(f, "remote error {}", self.code)
        } else {
            write!(f, "remote error {}: {}", self.code, self.message)
        }
    }
}
