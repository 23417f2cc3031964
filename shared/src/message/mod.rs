//! Order event stream messages
//!
//! The dashboard stream carries one JSON object per server-sent event. The
//! discriminator normally lives in the body's `type` field; servers that put
//! it in the SSE `event:` line instead are handled by [`decode`] too.

use crate::order::{Order, OrderStatus};
use crate::util::id_from_string_or_number;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Event kinds understood by the dashboard
pub const EVENT_KINDS: [&str; 5] = [
    "initial",
    "order_created",
    "order_updated",
    "order_deleted",
    "session_ended",
];

/// Decoded dashboard event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    /// Full snapshot sent right after the stream opens
    Initial { orders: Vec<Order> },
    OrderCreated { order: Order },
    OrderUpdated {
        #[serde(
            rename = "orderId",
            alias = "order_id",
            deserialize_with = "id_from_string_or_number"
        )]
        order_id: String,
        status: OrderStatus,
    },
    OrderDeleted {
        #[serde(
            rename = "orderId",
            alias = "order_id",
            deserialize_with = "id_from_string_or_number"
        )]
        order_id: String,
    },
    /// Table session closed; all of its orders leave the dashboard
    SessionEnded {
        #[serde(
            rename = "tableId",
            alias = "table_id",
            deserialize_with = "id_from_string_or_number"
        )]
        table_id: String,
    },
}

impl OrderEvent {
    /// Wire name of this event kind
    pub fn kind(&self) -> &'static str {
        match self {
            OrderEvent::Initial { .. } => "initial",
            OrderEvent::OrderCreated { .. } => "order_created",
            OrderEvent::OrderUpdated { .. } => "order_updated",
            OrderEvent::OrderDeleted { .. } => "order_deleted",
            OrderEvent::SessionEnded { .. } => "session_ended",
        }
    }

    /// Decode a body that carries its own `type` field
    pub fn from_json(data: &str) -> Result<Self, DecodeError> {
        decode(None, data)
    }
}

/// Per-message decode failure. The stream stays open; only this message is lost.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed JSON payload: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no event type")]
    MissingKind,

    #[error("unknown event type: {0}")]
    UnknownKind(String),

    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Decode one stream message.
///
/// `event_name` is the SSE `event:` field, if any. It is only consulted when
/// the body has no `type`. A bare order body under `event: order_created` is
/// wrapped as `{"order": ...}`.
pub fn decode(event_name: Option<&str>, data: &str) -> Result<OrderEvent, DecodeError> {
    let mut value: Value = serde_json::from_str(data).map_err(DecodeError::Malformed)?;
    let Value::Object(map) = &mut value else {
        return Err(DecodeError::NotAnObject);
    };

    if !map.contains_key("type") {
        let name = event_name
            .filter(|n| !n.is_empty() && *n != "message")
            .ok_or(DecodeError::MissingKind)?;
        if name == "order_created" && !map.contains_key("order") {
            let order = Value::Object(std::mem::take(map));
            let mut wrapped = Map::new();
            wrapped.insert("order".to_string(), order);
            *map = wrapped;
        }
        map.insert("type".to_string(), Value::String(name.to_string()));
    }

    let kind = match map.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(DecodeError::MissingKind),
    };
    if !EVENT_KINDS.contains(&kind.as_str()) {
        return Err(DecodeError::UnknownKind(kind));
    }

    serde_json::from_value(value).map_err(|source| DecodeError::InvalidPayload { kind, source })
}
