//! Inbound frame routing.
//!
//! Nothing here can tear down the connection: bad frames, bad events,
//! panicking handlers and undecodable confirmations all end up on the
//! diagnostics channel.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::time::Instant;

use crate::confirmation::{self, ACTION_CONFIRMATION_KIND};
use crate::error::RelayError;
use crate::event::Event;
use crate::relay::client::Shared;
use crate::relay::message::RelayMessage;
use crate::relay::notice::NoticeLimiter;
use crate::relay::notify::PublishResult;

#[derive(Debug)]
pub(crate) struct Dispatcher {
    notices: NoticeLimiter,
}

impl Dispatcher {
    pub(crate) fn new(notices: NoticeLimiter) -> Self {
        Self { notices }
    }

    /// Handle one inbound text frame.
    pub(crate) fn dispatch(&mut self, shared: &Shared, text: &str) {
        let msg = match RelayMessage::from_json(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("Dropping relay frame: {}", e);
                shared.notifier.diagnostic(e);
                return;
            }
        };

        match msg {
            RelayMessage::Event {
                subscription_id,
                event,
            } => self.on_event(shared, &subscription_id, &event),
            RelayMessage::Eose { subscription_id } => shared.notifier.eose(subscription_id),
            RelayMessage::Ok {
                event_id,
                success,
                message,
            } => shared.notifier.publish_result(PublishResult {
                event_id,
                success,
                message,
            }),
            RelayMessage::Notice { message } => {
                if self.notices.admit(&message, Instant::now()) {
                    shared.notifier.notice(message);
                } else {
                    tracing::debug!("NOTICE rate limit reached, dropping: {}", message);
                }
            }
        }
    }

    fn on_event(&mut self, shared: &Shared, subscription_id: &str, event: &Event) {
        // Handler is cloned out so the registry lock is not held while it runs.
        let handler = shared.registry().handler(subscription_id);

        if let Some(handler) = handler {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                tracing::warn!("Subscription handler {} panicked", subscription_id);
                shared.notifier.diagnostic(RelayError::Handler {
                    subscription_id: subscription_id.to_string(),
                    message: panic_message(panic.as_ref()),
                });
            }
        } else {
            tracing::debug!("EVENT for unknown subscription {}", subscription_id);
        }

        if event.kind == ACTION_CONFIRMATION_KIND {
            match confirmation::extract(event) {
                Ok(Some(confirmation)) => shared.notifier.confirmation(confirmation),
                Ok(None) => {}
                Err(e) => shared.notifier.diagnostic(e),
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_variants() {
        let err = catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "static");

        let err = catch_unwind(|| panic!("{}", format!("owned {}", 1))).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "owned 1");

        let err = catch_unwind(|| std::panic::panic_any(7u8)).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "handler panicked");
    }
}
