//! NIP-01 event and filter types.
//!
//! Events arriving from the relay are treated as untrusted wire data: every
//! field is type-checked by serde and the fixed-length hex fields are
//! checked again by [`Event::validate`] before any handler sees them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RelayError;

/// Length of `id` and `pubkey` in hex characters.
pub const HEX_KEY_LEN: usize = 64;

/// Length of `sig` in hex characters.
pub const HEX_SIG_LEN: usize = 128;

/// A signed Nostr event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// 32-byte lowercase hex SHA-256 of the serialized event
    pub id: String,
    /// 32-byte lowercase hex public key of the author
    pub pubkey: String,
    /// Unix timestamp in seconds
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    /// 64-byte lowercase hex Schnorr signature
    pub sig: String,
}

impl Event {
    /// Decode and validate an event from an untyped JSON value.
    pub fn from_value(value: Value) -> Result<Self, RelayError> {
        if !value.is_object() {
            return Err(RelayError::InvalidMessage("Event must be object".into()));
        }
        let event: Event = serde_json::from_value(value)
            .map_err(|e| RelayError::InvalidMessage(format!("Invalid event: {}", e)))?;
        event.validate()?;
        Ok(event)
    }

    /// Check the fixed-length hex fields.
    pub fn validate(&self) -> Result<(), RelayError> {
        check_hex("id", &self.id, HEX_KEY_LEN)?;
        check_hex("pubkey", &self.pubkey, HEX_KEY_LEN)?;
        check_hex("sig", &self.sig, HEX_SIG_LEN)?;
        Ok(())
    }
}

fn check_hex(field: &str, value: &str, len: usize) -> Result<(), RelayError> {
    let ok = value.len() == len
        && value
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if ok {
        Ok(())
    } else {
        Err(RelayError::InvalidMessage(format!(
            "Event {} must be {}-char lowercase hex",
            field, len
        )))
    }
}

/// Subscription filter.
///
/// Fields within one filter are AND'd, filters within one subscription are
/// OR'd. The client never interprets filters; they are serialized verbatim
/// into REQ frames.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    /// Tag queries keyed with their `#` prefix (`#e`, `#p`, `#d`, ...)
    #[serde(flatten)]
    pub tags: BTreeMap<String, Vec<String>>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(mut self, ids: Vec<String>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    pub fn kinds(mut self, kinds: Vec<u16>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn since(mut self, timestamp: u64) -> Self {
        self.since = Some(timestamp);
        self
    }

    pub fn until(mut self, timestamp: u64) -> Self {
        self.until = Some(timestamp);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Add a tag query. `key` is the tag letter without `#`.
    pub fn tag(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.tags.insert(format!("#{}", key.into()), values);
        self
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::{json, Value};

    pub const ID: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";
    pub const PUBKEY: &str = "0f1e2d3c4b5a69788796a5b4c3d2e1f00f1e2d3c4b5a69788796a5b4c3d2e1f0";

    pub fn sig() -> String {
        "ab".repeat(64)
    }

    pub fn event_json(kind: u16, content: &str) -> Value {
        json!({
            "id": ID,
            "pubkey": PUBKEY,
            "created_at": 1_700_000_000u64,
            "kind": kind,
            "tags": [["d", "sigil"]],
            "content": content,
            "sig": sig(),
        })
    }
}
