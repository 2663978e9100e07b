//! # Sigil Relay
//!
//! Client for a single NIP-01 relay: one long-lived WebSocket, filtered
//! subscriptions that survive reconnects, typed notification channels, and
//! decoding of the action confirmations (kind 30078) the relay republishes.
//!
//! ## Architecture
//!
//! 1. **Core**: Events, filters, URL validation, errors
//! 2. **Confirmations**: ILP packet decoding for kind-30078 events
//! 3. **Relay**: Wire frames, subscription registry, backoff, notice
//!    limiting, and the `RelayClient` connection task
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sigil_relay::prelude::*;
//!
//! let mut client = RelayClient::new(RelayConfig::new("wss://relay.example.com"))?;
//! let mut confirmations = client.confirmations();
//!
//! client.connect().await?;
//! client.subscribe(vec![Filter::new().kinds(vec![ACTION_CONFIRMATION_KIND])], |_| {})?;
//!
//! while let Ok(confirmation) = confirmations.recv().await {
//!     println!("{} paid {}", confirmation.reducer, confirmation.fee);
//! }
//! ```

// ── Core ─────────────────────────────────────────────────────────────────────

/// Relay client error types.
pub mod error;

/// Relay URL constants and validation.
pub mod network;

/// Signed events and subscription filters.
pub mod event;

// ── Confirmations ────────────────────────────────────────────────────────────

/// Action confirmations carried by kind-30078 events.
pub mod confirmation;

// ── Relay ────────────────────────────────────────────────────────────────────

/// Relay client: frames, subscriptions, connection management.
pub mod relay;

// ── Prelude ──────────────────────────────────────────────────────────────────

pub mod prelude {
    pub use crate::confirmation::{ActionConfirmation, IlpPacket, ACTION_CONFIRMATION_KIND};
    pub use crate::error::{RelayError, RelayResult};
    pub use crate::event::{Event, Filter};
    pub use crate::relay::{
        ConnectionChange, ConnectionState, Eose, PublishResult, ReconnectAttempt, RelayClient,
        RelayConfig, SubscriptionHandle, SubscriptionId,
    };
}
