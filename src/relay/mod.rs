//! Relay layer: frames, subscriptions, connection state and notifications.
//!
//! The connection itself is driven by a background tokio task owned by
//! [`RelayClient`]. The transport behind it is injected through the
//! [`Connector`] trait:
//! - `ws-native` feature → `tokio-tungstenite` ([`native`])
//! - tests → the in-memory connector in `testing`
//!
//! This module defines the shared configuration, state and notification
//! types.

pub mod backoff;
pub mod client;
pub mod message;
pub mod notice;
pub mod notify;
pub mod subscriptions;
pub mod timer;
pub mod transport;

mod dispatch;

#[cfg(feature = "ws-native")]
pub mod native;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use crate::error::RelayError;
use crate::network::DEFAULT_RELAY_URL;

pub use backoff::Backoff;
pub use client::RelayClient;
pub use message::{ClientMessage, RelayMessage};
pub use notify::{Eose, PublishResult, ReconnectAttempt};
pub use subscriptions::{SubscriptionHandle, SubscriptionId};
pub use transport::{Connector, OutboundFrame, TransportEvent};

// ─── Connection state ────────────────────────────────────────────────────────

/// Connection state of a [`RelayClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
    Failed = 4,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::Failed,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Emitted on every state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionChange {
    pub state: ConnectionState,
    /// Reconnect attempt about to be scheduled (`Reconnecting` only)
    pub attempt_number: Option<u32>,
    /// Delay before that attempt (`Reconnecting` only)
    pub next_attempt_delay: Option<Duration>,
    /// Cause of a `Failed` transition
    pub error: Option<RelayError>,
}

impl ConnectionChange {
    pub(crate) fn plain(state: ConnectionState) -> Self {
        Self {
            state,
            attempt_number: None,
            next_attempt_delay: None,
            error: None,
        }
    }

    pub(crate) fn failed(error: RelayError) -> Self {
        Self {
            error: Some(error),
            ..Self::plain(ConnectionState::Failed)
        }
    }

    pub(crate) fn reconnecting(attempt_number: u32, delay: Duration) -> Self {
        Self {
            attempt_number: Some(attempt_number),
            next_attempt_delay: Some(delay),
            ..Self::plain(ConnectionState::Reconnecting)
        }
    }
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Configuration for the relay client.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Relay URL, `ws://` or `wss://`
    pub url: String,
    /// Reconnect after an abnormal close of an established connection
    pub auto_reconnect: bool,
    /// Reconnect attempts before giving up. 0 = unlimited
    pub max_reconnect_attempts: u32,
    /// First backoff delay
    pub initial_delay: Duration,
    /// Backoff ceiling before jitter
    pub max_delay: Duration,
    /// Symmetric jitter applied to each backoff delay, in percent
    pub jitter_percent: u32,
    /// How long a socket may take to open
    pub connect_timeout: Duration,
    /// Notices admitted per window
    pub notice_limit: usize,
    /// Rolling notice window
    pub notice_window: Duration,
    /// Capacity of each notification channel
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RELAY_URL.to_string(),
            auto_reconnect: true,
            max_reconnect_attempts: 0,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter_percent: 10,
            connect_timeout: Duration::from_secs(10),
            notice_limit: 10,
            notice_window: Duration::from_secs(60),
            channel_capacity: 256,
        }
    }
}

impl RelayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_backoff(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter_percent(mut self, percent: u32) -> Self {
        self.jitter_percent = percent;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_notice_limit(mut self, limit: usize, window: Duration) -> Self {
        self.notice_limit = limit;
        self.notice_window = window;
        self
    }

    /// Backoff settings derived from this config.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            jitter_percent: self.jitter_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RelayConfig::default();
        assert_eq!(config.url, "ws://localhost:4040");
        assert!(config.auto_reconnect);
        assert_eq!(config.max_reconnect_attempts, 0);
        assert_eq!(config.initial_delay, Duration::from_millis(1000));
        assert_eq!(config.max_delay, Duration::from_millis(30_000));
        assert_eq!(config.jitter_percent, 10);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.notice_limit, 10);
        assert_eq!(config.notice_window, Duration::from_secs(60));
    }

    #[test]
    fn test_config_setters() {
        let config = RelayConfig::new("wss://relay.example.com")
            .with_auto_reconnect(false)
            .with_max_reconnect_attempts(3)
            .with_backoff(Duration::from_millis(5), Duration::from_millis(50))
            .with_jitter_percent(0);
        assert_eq!(config.url, "wss://relay.example.com");
        assert!(!config.auto_reconnect);
        assert_eq!(config.max_reconnect_attempts, 3);
        let backoff = config.backoff();
        assert_eq!(backoff.initial_delay, Duration::from_millis(5));
        assert_eq!(backoff.max_delay, Duration::from_millis(50));
        assert_eq!(backoff.jitter_percent, 0);
    }

    #[test]
    fn test_connection_state_roundtrip() {
        for state in [
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::Failed,
        ] {
            assert_eq!(ConnectionState::from(state as u8), state);
        }
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
    }
}
