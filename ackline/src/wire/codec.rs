//! Pluggable text codec for wire messages.
//!
//! The [`WireCodec`] trait lets a deployment swap the on-wire text format;
//! [`JsonCodec`] is the default and the only format the peer speaks today.
//!
//! # Example
//!
//! ```rust
//! use ackline::wire::{JsonCodec, WireCodec, WireMessage};
//!
//! let codec = JsonCodec;
//! let bytes = codec.encode(&WireMessage::Ack { transaction_id: 7 }).unwrap();
//! assert_eq!(&bytes, br#"{"ack":7}"#);
//!
//! let decoded = codec.decode(&bytes).unwrap();
//! assert_eq!(decoded, WireMessage::Ack { transaction_id: 7 });
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    CORE_CLASS, Outcome, PING_COMMAND, Payload, TransactionId, WireError, WireMessage,
};

/// Text encoding of [`WireMessage`]s.
///
/// Implementations must preserve class and command strings, transaction ids
/// as non-negative integers, and payloads as ordered mappings with nested
/// values reproduced exactly.
pub trait WireCodec: Clone + Send + Sync + 'static {
    /// Encode a message to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Encode`] if the message cannot be rendered.
    fn encode(&self, msg: &WireMessage) -> Result<Vec<u8>, WireError>;

    /// Decode bytes into a message.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Decode`] for malformed text and
    /// [`WireError::ProtocolViolation`] for unrecognized shapes.
    fn decode(&self, buf: &[u8]) -> Result<WireMessage, WireError>;
}

/// JSON codec using serde_json with insertion-ordered objects.
#[derive(Clone, Default, Debug, Copy)]
pub struct JsonCodec;

/// Flat view of every field any frame shape may carry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RawFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tid: Option<TransactionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ack: Option<TransactionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Payload>,
}

impl RawFrame {
    fn from_message(msg: &WireMessage) -> Self {
        match msg {
            WireMessage::Request {
                class,
                command,
                transaction_id,
                payload,
            } => RawFrame {
                class: Some(class.clone()),
                cmd: Some(command.clone()),
                tid: Some(*transaction_id),
                data: non_empty(payload),
                ..Default::default()
            },
            WireMessage::Response {
                transaction_id,
                outcome,
                payload,
            } => RawFrame {
                result: Some(*outcome),
                tid: Some(*transaction_id),
                data: non_empty(payload),
                ..Default::default()
            },
            WireMessage::Ack { transaction_id } => RawFrame {
                ack: Some(*transaction_id),
                ..Default::default()
            },
            WireMessage::Ping { transaction_id } => RawFrame {
                class: Some(CORE_CLASS.to_string()),
                cmd: Some(PING_COMMAND.to_string()),
                tid: Some(*transaction_id),
                ..Default::default()
            },
        }
    }

    fn into_message(self) -> Result<WireMessage, WireError> {
        let RawFrame {
            class,
            cmd,
            result,
            tid,
            ack,
            data,
        } = self;
        let payload = data.unwrap_or_default();
        match (class, cmd, result, tid, ack) {
            (None, None, None, _, Some(transaction_id)) => Ok(WireMessage::Ack { transaction_id }),
            (None, None, Some(outcome), Some(transaction_id), None) => Ok(WireMessage::Response {
                transaction_id,
                outcome,
                payload,
            }),
            (Some(class), Some(command), None, Some(transaction_id), None) => {
                if class == CORE_CLASS && command == PING_COMMAND {
                    Ok(WireMessage::Ping { transaction_id })
                } else {
                    Ok(WireMessage::Request {
                        class,
                        command,
                        transaction_id,
                        payload,
                    })
                }
            }
            (class, cmd, result, tid, ack) => Err(WireError::ProtocolViolation {
                message: format!(
                    "unrecognized frame shape: class={:?} cmd={:?} result={:?} tid={:?} ack={:?}",
                    class, cmd, result, tid, ack
                ),
            }),
        }
    }
}

fn non_empty(payload: &Payload) -> Option<Payload> {
    if payload.is_empty() {
        None
    } else {
        Some(payload.clone())
    }
}

impl WireCodec for JsonCodec {
    fn encode(&self, msg: &WireMessage) -> Result<Vec<u8>, WireError> {
        serde_json::to_vec(&RawFrame::from_message(msg)).map_err(|e| WireError::Encode {
            message: e.to_string(),
        })
    }

    fn decode(&self, buf: &[u8]) -> Result<WireMessage, WireError> {
        // Parse to a value first so malformed text and bad shapes stay distinct.
        let value: Value = serde_json::from_slice(buf).map_err(|e| WireError::Decode {
            message: e.to_string(),
        })?;
        if !value.is_object() {
            return Err(WireError::ProtocolViolation {
                message: format!("expected an object, got {}", value),
            });
        }
        let raw: RawFrame =
            serde_json::from_value(value).map_err(|e| WireError::ProtocolViolation {
                message: e.to_string(),
            })?;
        raw.into_message()
    }
}
