//! Caches subscribe frames per subscription id so a reconnect can replay
//! the full set onto a fresh transport.

use std::collections::HashMap;

use surveil_model::InstrumentId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubscriptionId {
    Global,
    Instrument(InstrumentId),
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub message: String,
}

#[derive(Default)]
pub struct SubscriptionManager {
    subscriptions: HashMap<SubscriptionId, Vec<Subscription>>,
    cached_messages: Vec<Subscription>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_instrument(&mut self, instrument: InstrumentId, message: String) {
        let subscription = Subscription {
            id: SubscriptionId::Instrument(instrument.clone()),
            message,
        };
        self.subscriptions
            .entry(SubscriptionId::Instrument(instrument))
            .or_default()
            .push(subscription.clone());
        self.cached_messages.push(subscription);
    }

    pub fn register_global(&mut self, message: String) {
        let subscription = Subscription {
            id: SubscriptionId::Global,
            message,
        };
        self.subscriptions
            .entry(SubscriptionId::Global)
            .or_default()
            .push(subscription.clone());
        self.cached_messages.push(subscription);
    }

    pub fn is_empty(&self) -> bool {
        self.cached_messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
        self.cached_messages.clear();
    }

    /// All subscribe frames in registration order, for replay after
    /// reconnect.
    pub fn messages(&self) -> Vec<String> {
        self.cached_messages
            .iter()
            .map(|s| s.message.clone())
            .collect()
    }
}
