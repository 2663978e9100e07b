//! Action confirmations carried by kind-30078 events.
//!
//! The relay republishes every completed game action as an event of the
//! reserved kind whose `content` is a JSON-encoded ILP packet.

use serde::Deserialize;
use serde_json::Value;

use crate::error::RelayError;
use crate::event::Event;

/// Event kind reserved for action confirmations.
pub const ACTION_CONFIRMATION_KIND: u16 = 30078;

/// Payload embedded in a confirmation event's `content`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IlpPacket {
    /// Reducer name
    pub reducer: String,
    /// Reducer arguments, any JSON value (including `null`)
    pub args: Value,
    /// ILP cost in the smallest unit
    pub fee: f64,
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub nonce: Option<String>,
}

impl IlpPacket {
    /// Parse a packet from event content.
    pub fn parse(content: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
        if !value.is_object() {
            return Err("ILP packet must be a JSON object".to_string());
        }
        serde_json::from_value(value).map_err(|e| e.to_string())
    }
}

/// A confirmed application action.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionConfirmation {
    pub event_id: String,
    pub reducer: String,
    pub args: Value,
    pub fee: f64,
    /// Author of the confirmation event
    pub pubkey: String,
    /// `created_at` of the confirmation event
    pub timestamp: u64,
}

/// Decode the confirmation carried by `event`.
///
/// Returns `Ok(None)` for events of any other kind.
pub fn extract(event: &Event) -> Result<Option<ActionConfirmation>, RelayError> {
    if event.kind != ACTION_CONFIRMATION_KIND {
        return Ok(None);
    }

    let packet = IlpPacket::parse(&event.content).map_err(|message| RelayError::IlpParse {
        event_id: event.id.clone(),
        message,
    })?;

    Ok(Some(ActionConfirmation {
        event_id: event.id.clone(),
        reducer: packet.reducer,
        args: packet.args,
        fee: packet.fee,
        pubkey: event.pubkey.clone(),
        timestamp: event.created_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::fixtures::event_json;
    use serde_json::json;

    fn event(kind: u16, content: &str) -> Event {
        Event::from_value(event_json(kind, content)).unwrap()
    }

    #[test]
    fn test_extract_player_move() {
        let ev = event(
            ACTION_CONFIRMATION_KIND,
            r#"{"reducer":"player_move","args":[1,2,3],"fee":500}"#,
        );
        let confirmation = extract(&ev).unwrap().unwrap();
        assert_eq!(confirmation.reducer, "player_move");
        assert_eq!(confirmation.args, json!([1, 2, 3]));
        assert_eq!(confirmation.fee, 500.0);
        assert_eq!(confirmation.event_id, ev.id);
        assert_eq!(confirmation.pubkey, ev.pubkey);
        assert_eq!(confirmation.timestamp, ev.created_at);
    }

    #[test]
    fn test_extract_ignores_other_kinds() {
        let ev = event(1, r#"{"reducer":"player_move","args":[],"fee":1}"#);
        assert_eq!(extract(&ev).unwrap(), None);
    }

    #[test]
    fn test_extract_accepts_null_args_and_optional_fields() {
        let ev = event(
            ACTION_CONFIRMATION_KIND,
            r#"{"reducer":"craft","args":null,"fee":1.5,"timestamp":99,"nonce":"n-1"}"#,
        );
        let confirmation = extract(&ev).unwrap().unwrap();
        assert_eq!(confirmation.args, Value::Null);
        assert_eq!(confirmation.fee, 1.5);
        // Event time wins over the packet's own timestamp
        assert_eq!(confirmation.timestamp, 1_700_000_000);
    }

    #[test]
    fn test_extract_rejects_malformed_payloads() {
        for content in [
            "{not json",
            r#"["player_move",[1],500]"#,
            r#"{"reducer":"player_move","fee":500}"#,
            r#"{"reducer":7,"args":[],"fee":500}"#,
            r#"{"reducer":"player_move","args":[],"fee":"500"}"#,
            r#""just a string""#,
        ] {
            let err = extract(&event(ACTION_CONFIRMATION_KIND, content)).unwrap_err();
            assert_eq!(err.code(), "ILP_PARSE_ERROR", "{content}");
        }
    }
}
