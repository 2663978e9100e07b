//! Wire frames.
//!
//! Client → relay: `REQ`, `CLOSE`.
//! Relay → client: `EVENT`, `EOSE`, `OK`, `NOTICE`.

use serde_json::Value;

use crate::error::RelayError;
use crate::event::{Event, Filter};

// ─── Outbound ────────────────────────────────────────────────────────────────

/// Frames sent from client to relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `["REQ", <subscription_id>, <filter1>, <filter2>, ...]`
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },
    /// `["CLOSE", <subscription_id>]`
    Close { subscription_id: String },
}

impl ClientMessage {
    pub fn req(subscription_id: impl Into<String>, filters: Vec<Filter>) -> Self {
        ClientMessage::Req {
            subscription_id: subscription_id.into(),
            filters,
        }
    }

    pub fn close(subscription_id: impl Into<String>) -> Self {
        ClientMessage::Close {
            subscription_id: subscription_id.into(),
        }
    }

    /// Serialize to the JSON array sent on the wire.
    pub fn to_json(&self) -> Result<String, RelayError> {
        let value = match self {
            ClientMessage::Req {
                subscription_id,
                filters,
            } => {
                let mut arr = Vec::with_capacity(filters.len() + 2);
                arr.push(Value::String("REQ".to_string()));
                arr.push(Value::String(subscription_id.clone()));
                for filter in filters {
                    arr.push(serde_json::to_value(filter)?);
                }
                Value::Array(arr)
            }
            ClientMessage::Close { subscription_id } => {
                serde_json::json!(["CLOSE", subscription_id])
            }
        };
        Ok(value.to_string())
    }

    pub fn subscription_id(&self) -> &str {
        match self {
            ClientMessage::Req {
                subscription_id, ..
            }
            | ClientMessage::Close { subscription_id } => subscription_id,
        }
    }
}

// ─── Inbound ─────────────────────────────────────────────────────────────────

/// Frames sent from relay to client, already validated.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// `["EVENT", <subscription_id>, <event>]`
    Event {
        subscription_id: String,
        event: Event,
    },
    /// `["EOSE", <subscription_id>]`
    Eose { subscription_id: String },
    /// `["OK", <event_id>, <true|false>, <message>]`
    Ok {
        event_id: String,
        success: bool,
        message: String,
    },
    /// `["NOTICE", <message>]`
    Notice { message: String },
}

impl RelayMessage {
    /// Parse and validate one inbound text frame.
    pub fn from_json(json: &str) -> Result<Self, RelayError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| RelayError::InvalidMessage(format!("Message parsing error: {}", e)))?;

        let arr = match value {
            Value::Array(arr) if !arr.is_empty() => arr,
            _ => {
                return Err(RelayError::InvalidMessage(
                    "Invalid message format: must be non-empty array".to_string(),
                ))
            }
        };

        let mut items = arr.into_iter();
        let tag = items.next().unwrap_or(Value::Null);
        let args: Vec<Value> = items.collect();

        match tag.as_str() {
            Some("EVENT") => {
                let [subscription_id, event] = expect_args::<2>("EVENT", args)?;
                let subscription_id = expect_string("EVENT subscription_id", subscription_id)?;
                let event = Event::from_value(event)?;
                Ok(RelayMessage::Event {
                    subscription_id,
                    event,
                })
            }
            Some("EOSE") => {
                let [subscription_id] = expect_args::<1>("EOSE", args)?;
                Ok(RelayMessage::Eose {
                    subscription_id: expect_string("EOSE subscription_id", subscription_id)?,
                })
            }
            Some("OK") => {
                let [event_id, success, message] = expect_args::<3>("OK", args)?;
                let event_id = expect_string("OK event_id", event_id)?;
                let success = success.as_bool().ok_or_else(|| {
                    RelayError::InvalidMessage("OK success must be boolean".to_string())
                })?;
                let message = expect_string("OK message", message)?;
                Ok(RelayMessage::Ok {
                    event_id,
                    success,
                    message,
                })
            }
            Some("NOTICE") => {
                let [message] = expect_args::<1>("NOTICE", args)?;
                Ok(RelayMessage::Notice {
                    message: expect_string("NOTICE message", message)?,
                })
            }
            Some(other) => Err(RelayError::UnknownMessageType(other.to_string())),
            None => Err(RelayError::UnknownMessageType(tag.to_string())),
        }
    }
}

fn expect_args<const N: usize>(frame: &str, args: Vec<Value>) -> Result<[Value; N], RelayError> {
    args.try_into()
        .map_err(|_| RelayError::InvalidMessage(format!("Invalid {} message format", frame)))
}

fn expect_string(what: &str, value: Value) -> Result<String, RelayError> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(RelayError::InvalidMessage(format!("{} must be string", what))),
    }
}
