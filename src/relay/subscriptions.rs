//! Subscription registry.
//!
//! Live subscriptions are kept in an arena keyed by insertion sequence, with
//! an id index on the side, so REQ frames always go out in registration
//! order. Each entry remembers the connection epoch its REQ was last sent
//! in; [`SubscriptionRegistry::take_pending`] yields a REQ for every entry
//! not yet declared on the current connection, which makes the flush after
//! a reconnect and the immediate send after `subscribe()` the same
//! operation, and keeps both at one REQ per subscription per connection.
//!
//! Epochs come from [`SubscriptionRegistry::begin_epoch`] and never repeat
//! for the lifetime of the registry, across connection cycles included.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::RelayError;
use crate::event::{Event, Filter};
use crate::relay::client::Shared;
use crate::relay::message::ClientMessage;

/// Callback invoked for every event delivered to a subscription.
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Client-generated subscription id (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

struct Entry {
    id: SubscriptionId,
    filters: Vec<Filter>,
    handler: EventHandler,
    sent_epoch: Option<u64>,
}

/// Live subscriptions, in registration order.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: BTreeMap<u64, Entry>,
    index: HashMap<SubscriptionId, u64>,
    next_seq: u64,
    epoch: u64,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new subscription under a fresh id.
    pub fn insert(
        &mut self,
        filters: Vec<Filter>,
        handler: EventHandler,
    ) -> Result<SubscriptionId, RelayError> {
        if filters.is_empty() {
            return Err(RelayError::InvalidSubscription(
                "at least one filter is required".to_string(),
            ));
        }

        let id = SubscriptionId::generate();
        let seq = self.next_seq;
        self.next_seq += 1;

        self.index.insert(id.clone(), seq);
        self.entries.insert(
            seq,
            Entry {
                id: id.clone(),
                filters,
                handler,
                sent_epoch: None,
            },
        );
        Ok(id)
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn remove(&mut self, id: &SubscriptionId) -> bool {
        match self.index.remove(id) {
            Some(seq) => self.entries.remove(&seq).is_some(),
            None => false,
        }
    }

    /// Start a new connection epoch. Every entry becomes pending again.
    pub fn begin_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.index.contains_key(id)
    }

    /// Handler for a subscription id received from the relay.
    pub fn handler(&self, id: &str) -> Option<EventHandler> {
        let seq = self.index.get(&SubscriptionId::from(id))?;
        self.entries.get(seq).map(|e| Arc::clone(&e.handler))
    }

    #[cfg(test)]
    fn filters(&self, id: &SubscriptionId) -> Option<&[Filter]> {
        let seq = self.index.get(id)?;
        self.entries.get(seq).map(|e| e.filters.as_slice())
    }

    /// Ids in registration order.
    pub fn ids(&self) -> Vec<SubscriptionId> {
        self.entries.values().map(|e| e.id.clone()).collect()
    }

    /// REQ frames for every entry not yet sent during `epoch`, in
    /// registration order. Entries are stamped as sent.
    pub fn take_pending(&mut self, epoch: u64) -> Vec<ClientMessage> {
        self.entries
            .values_mut()
            .filter(|e| e.sent_epoch != Some(epoch))
            .map(|e| {
                e.sent_epoch = Some(epoch);
                ClientMessage::req(e.id.as_str(), e.filters.clone())
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// Returned by [`RelayClient::subscribe`](crate::relay::RelayClient::subscribe).
///
/// Holds only a weak reference to the client, so keeping a handle around
/// does not keep a disposed client alive.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    filters: Vec<Filter>,
    shared: Weak<Shared>,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: SubscriptionId, filters: Vec<Filter>, shared: Weak<Shared>) -> Self {
        Self {
            id,
            filters,
            shared,
        }
    }

    pub fn id(&self) -> &SubscriptionId {
        &self.id
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Whether the subscription is still registered.
    pub fn is_active(&self) -> bool {
        self.shared
            .upgrade()
            .map(|shared| shared.registry().contains(&self.id))
            .unwrap_or(false)
    }

    /// Remove the subscription and send CLOSE if connected.
    ///
    /// Calling this again, or after the client is gone, does nothing.
    pub fn unsubscribe(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.unsubscribe(&self.id);
        }
    }
}
