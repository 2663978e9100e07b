//! Typed notification channels.
//!
//! Each notification kind has its own `broadcast` channel so a consumer
//! listens for exactly the type it cares about. Emitting never blocks and
//! never fails: with no receivers the value is simply dropped.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::confirmation::ActionConfirmation;
use crate::error::RelayError;
use crate::relay::ConnectionChange;

/// End of stored events for one subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eose {
    pub subscription_id: String,
}

/// Relay answer to a published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub event_id: String,
    pub success: bool,
    pub message: String,
}

/// One scheduled reconnect attempt. Sent for every attempt, including
/// those that do not change the connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectAttempt {
    pub attempt_number: u32,
    pub delay: Duration,
}

#[derive(Debug)]
pub(crate) struct Notifier {
    connection: broadcast::Sender<ConnectionChange>,
    reconnect_attempts: broadcast::Sender<ReconnectAttempt>,
    diagnostics: broadcast::Sender<RelayError>,
    eose: broadcast::Sender<Eose>,
    publish_results: broadcast::Sender<PublishResult>,
    notices: broadcast::Sender<String>,
    confirmations: broadcast::Sender<ActionConfirmation>,
}

impl Notifier {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            connection: broadcast::channel(capacity).0,
            reconnect_attempts: broadcast::channel(capacity).0,
            diagnostics: broadcast::channel(capacity).0,
            eose: broadcast::channel(capacity).0,
            publish_results: broadcast::channel(capacity).0,
            notices: broadcast::channel(capacity).0,
            confirmations: broadcast::channel(capacity).0,
        }
    }

    pub(crate) fn connection_change(&self, change: ConnectionChange) {
        let _ = self.connection.send(change);
    }

    pub(crate) fn reconnect_attempt(&self, attempt_number: u32, delay: Duration) {
        let _ = self.reconnect_attempts.send(ReconnectAttempt {
            attempt_number,
            delay,
        });
    }

    pub(crate) fn diagnostic(&self, error: RelayError) {
        tracing::debug!(code = error.code(), "relay diagnostic: {}", error);
        let _ = self.diagnostics.send(error);
    }

    pub(crate) fn eose(&self, subscription_id: String) {
        let _ = self.eose.send(Eose { subscription_id });
    }

    pub(crate) fn publish_result(&self, result: PublishResult) {
        let _ = self.publish_results.send(result);
    }

    pub(crate) fn notice(&self, message: String) {
        let _ = self.notices.send(message);
    }

    pub(crate) fn confirmation(&self, confirmation: ActionConfirmation) {
        let _ = self.confirmations.send(confirmation);
    }

    pub(crate) fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionChange> {
        self.connection.subscribe()
    }

    pub(crate) fn subscribe_reconnect_attempts(&self) -> broadcast::Receiver<ReconnectAttempt> {
        self.reconnect_attempts.subscribe()
    }

    pub(crate) fn subscribe_diagnostics(&self) -> broadcast::Receiver<RelayError> {
        self.diagnostics.subscribe()
    }

    pub(crate) fn subscribe_eose(&self) -> broadcast::Receiver<Eose> {
        self.eose.subscribe()
    }

    pub(crate) fn subscribe_publish_results(&self) -> broadcast::Receiver<PublishResult> {
        self.publish_results.subscribe()
    }

    pub(crate) fn subscribe_notices(&self) -> broadcast::Receiver<String> {
        self.notices.subscribe()
    }

    pub(crate) fn subscribe_confirmations(&self) -> broadcast::Receiver<ActionConfirmation> {
        self.confirmations.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_listeners_is_silent() {
        let notifier = Notifier::new(4);
        notifier.diagnostic(RelayError::NotConnected);
        notifier.notice("hello".into());
        notifier.eose("sub".into());
    }

    #[test]
    fn test_listener_receives_only_its_kind() {
        let notifier = Notifier::new(4);
        let mut notices = notifier.subscribe_notices();
        let mut eose = notifier.subscribe_eose();

        notifier.notice("hello".into());

        assert_eq!(notices.try_recv().unwrap(), "hello");
        assert!(eose.try_recv().is_err());
    }

    #[test]
    fn test_reconnect_attempts_not_deduplicated() {
        let notifier = Notifier::new(4);
        let mut attempts = notifier.subscribe_reconnect_attempts();

        notifier.reconnect_attempt(1, Duration::from_millis(10));
        notifier.reconnect_attempt(2, Duration::from_millis(20));

        assert_eq!(attempts.try_recv().unwrap().attempt_number, 1);
        let second = attempts.try_recv().unwrap();
        assert_eq!(second.attempt_number, 2);
        assert_eq!(second.delay, Duration::from_millis(20));
    }
}
