//! Relay client error types.

use thiserror::Error;

/// Boundary name attached to every diagnostic this crate emits.
pub const BOUNDARY: &str = "nostr-relay";

/// Errors produced by the relay client.
///
/// Connection-level variants are surfaced through `connect()` and the
/// connection-change channel. Message-level variants (`InvalidMessage`,
/// `UnknownMessageType`, `Handler`, `IlpParse`) only ever travel over the
/// diagnostics channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// Relay URL rejected at construction
    #[error("Invalid relay URL format: {0}. Must be ws:// or wss://")]
    InvalidRelayUrl(String),

    /// Socket did not open within the connect timeout
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// Transport-level error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Transport could not be created
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Socket closed in a way that does not allow reconnection
    #[error("Connection closed: {code} - {reason}")]
    ConnectionClosed { code: u16, reason: String },

    /// Reconnect cap configured and exceeded
    #[error("Max reconnection attempts reached ({0})")]
    MaxReconnectAttempts(u32),

    /// Malformed inbound frame or event
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Inbound frame with an unrecognized tag
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// A subscription handler panicked
    #[error("Error in subscription handler {subscription_id}: {message}")]
    Handler {
        subscription_id: String,
        message: String,
    },

    /// Action confirmation payload could not be decoded
    #[error("Failed to parse ILP packet from event {event_id}: {message}")]
    IlpParse { event_id: String, message: String },

    /// Subscription request rejected before it was stored
    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error("Not connected to relay")]
    NotConnected,

    /// Background task went away
    #[error("Internal channel closed")]
    ChannelClosed,
}

impl RelayError {
    /// Stable diagnostic code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::InvalidRelayUrl(_) => "INVALID_RELAY_URL",
            RelayError::ConnectionTimeout => "CONNECTION_TIMEOUT",
            RelayError::WebSocket(_) => "WEBSOCKET_ERROR",
            RelayError::ConnectionFailed(_) => "CONNECTION_FAILED",
            RelayError::ConnectionClosed { .. } => "CONNECTION_CLOSED",
            RelayError::MaxReconnectAttempts(_) => "MAX_RECONNECT_ATTEMPTS",
            RelayError::InvalidMessage(_) => "INVALID_MESSAGE",
            RelayError::UnknownMessageType(_) => "UNKNOWN_MESSAGE_TYPE",
            RelayError::Handler { .. } => "HANDLER_ERROR",
            RelayError::IlpParse { .. } => "ILP_PARSE_ERROR",
            RelayError::InvalidSubscription(_) => "INVALID_SUBSCRIPTION",
            RelayError::NotConnected => "NOT_CONNECTED",
            RelayError::ChannelClosed => "CHANNEL_CLOSED",
        }
    }

    /// Boundary the error belongs to.
    pub fn boundary(&self) -> &'static str {
        BOUNDARY
    }

    /// Whether this error is reported only as a diagnostic and never changes
    /// connection state.
    pub fn is_message_level(&self) -> bool {
        matches!(
            self,
            RelayError::InvalidMessage(_)
                | RelayError::UnknownMessageType(_)
                | RelayError::Handler { .. }
                | RelayError::IlpParse { .. }
        )
    }
}

#[cfg(feature = "ws-native")]
impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error;
        match err {
            Error::ConnectionClosed | Error::AlreadyClosed => RelayError::ConnectionClosed {
                code: 1000,
                reason: "Connection closed normally".to_string(),
            },
            Error::Url(e) => RelayError::InvalidRelayUrl(e.to_string()),
            Error::Http(resp) => {
                RelayError::ConnectionFailed(format!("HTTP error: {:?}", resp.status()))
            }
            Error::HttpFormat(e) => RelayError::ConnectionFailed(e.to_string()),
            other => RelayError::WebSocket(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::InvalidMessage(err.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for RelayError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        RelayError::ChannelClosed
    }
}

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_diagnostic_names() {
        assert_eq!(RelayError::ConnectionTimeout.code(), "CONNECTION_TIMEOUT");
        assert_eq!(
            RelayError::InvalidMessage("x".into()).code(),
            "INVALID_MESSAGE"
        );
        assert_eq!(
            RelayError::Handler {
                subscription_id: "s".into(),
                message: "boom".into(),
            }
            .code(),
            "HANDLER_ERROR"
        );
        assert_eq!(
            RelayError::IlpParse {
                event_id: "e".into(),
                message: "bad".into(),
            }
            .code(),
            "ILP_PARSE_ERROR"
        );
        assert_eq!(RelayError::MaxReconnectAttempts(3).boundary(), "nostr-relay");
    }

    #[test]
    fn test_message_level_classification() {
        assert!(RelayError::UnknownMessageType("AUTH".into()).is_message_level());
        assert!(!RelayError::ConnectionTimeout.is_message_level());
        assert!(!RelayError::MaxReconnectAttempts(1).is_message_level());
    }

    #[test]
    fn test_serde_error_becomes_invalid_message() {
        let err: RelayError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert_eq!(err.code(), "INVALID_MESSAGE");
    }
}
