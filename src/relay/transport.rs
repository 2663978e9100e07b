//! Transport abstraction.
//!
//! The connection task only ever sees a boxed sink of [`OutboundFrame`]s
//! and a boxed stream of [`TransportEvent`]s. Anything that can produce
//! that pair can carry the relay protocol.

use std::pin::Pin;

use futures_util::future::BoxFuture;
use futures_util::{Sink, Stream};

use crate::error::RelayError;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Endpoint going away.
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Closed without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Frames written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Close { code: u16, reason: String },
}

/// Things read from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    Closed { code: u16, reason: String },
    Error(String),
}

pub type TransportSink = Pin<Box<dyn Sink<OutboundFrame, Error = RelayError> + Send>>;
pub type TransportStream = Pin<Box<dyn Stream<Item = TransportEvent> + Send>>;

/// An open socket, split into its two halves.
pub struct Transport {
    pub sink: TransportSink,
    pub stream: TransportStream,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// Opens transports to a relay URL.
///
/// The returned future resolves once the socket is open. The caller applies
/// its own connect timeout and may drop the future at any time.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Transport, RelayError>>;
}

/// Whether a close code ends the connection cycle without reconnecting.
pub fn is_normal_close(code: u16) -> bool {
    code == CLOSE_NORMAL || code == CLOSE_GOING_AWAY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_close_codes() {
        assert!(is_normal_close(1000));
        assert!(is_normal_close(1001));
        assert!(!is_normal_close(1006));
        assert!(!is_normal_close(1011));
    }
}
