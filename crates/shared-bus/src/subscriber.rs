//! # Event Subscriber
//!
//! Defines the subscription side of the event bus.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use serde_json::Value;
use tracing::debug;

use crate::error::BusError;
use crate::publisher::TraceMeta;

/// Callback invoked for every message delivered to a subscriber.
///
/// Returning `Err` (or panicking) marks the delivery as failed in the trace;
/// it never reaches the publisher or other subscribers.
pub type Handler = Arc<dyn Fn(&Value, &TraceMeta) -> anyhow::Result<()> + Send + Sync>;

/// Options supplied at subscription time.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Identifier reported in trace results.
    pub subscriber_id: Option<String>,
}

impl SubscribeOptions {
    /// Options carrying a subscriber id.
    #[must_use]
    pub fn id(subscriber_id: impl Into<String>) -> Self {
        Self {
            subscriber_id: Some(subscriber_id.into()),
        }
    }
}

/// A registered handler.
pub(crate) struct SubscriberEntry {
    /// Registration order, unique per bus.
    pub(crate) id: u64,
    pub(crate) subscriber_id: Option<String>,
    pub(crate) handler: Handler,
}

/// Per-event subscriber lists, in registration order.
pub(crate) type SubscriberMap = HashMap<String, Vec<Arc<SubscriberEntry>>>;

/// Trait for registering handlers on a bus.
pub trait EventSubscriber: Send + Sync {
    /// Register a boxed handler.
    fn subscribe_handler(
        &self,
        event: &str,
        options: SubscribeOptions,
        handler: Handler,
    ) -> Result<Subscription, BusError>;

    /// Register a handler without a subscriber id.
    fn on<F>(&self, event: &str, handler: F) -> Result<Subscription, BusError>
    where
        F: Fn(&Value, &TraceMeta) -> anyhow::Result<()> + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe_handler(event, SubscribeOptions::default(), Arc::new(handler))
    }

    /// Register a handler with options.
    fn on_with<F>(
        &self,
        event: &str,
        options: SubscribeOptions,
        handler: F,
    ) -> Result<Subscription, BusError>
    where
        F: Fn(&Value, &TraceMeta) -> anyhow::Result<()> + Send + Sync + 'static,
        Self: Sized,
    {
        self.subscribe_handler(event, options, Arc::new(handler))
    }
}

/// Handle returned by `on`; call `unsubscribe` to stop delivery.
///
/// Dropping the handle does NOT unsubscribe: a subscription lives until it is
/// explicitly removed or the bus is cleared. Clones share state, so
/// unsubscribing through any clone deactivates all of them.
#[derive(Clone)]
#[must_use = "dropping a Subscription keeps the handler registered; keep it to unsubscribe later"]
pub struct Subscription {
    event: String,
    entry_id: u64,
    registry: Weak<RwLock<SubscriberMap>>,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub(crate) fn new(event: String, entry_id: u64, registry: Weak<RwLock<SubscriberMap>>) -> Self {
        Self {
            event,
            entry_id,
            registry,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Remove the handler from future dispatches.
    ///
    /// Returns `true` the first time; later calls are no-ops returning `false`.
    /// A dispatch already in progress still completes with its snapshot.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }

        let Some(registry) = self.registry.upgrade() else {
            return true;
        };
        let mut subs = registry.write().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = subs.get_mut(&self.event) {
            list.retain(|entry| entry.id != self.entry_id);
            if list.is_empty() {
                subs.remove(&self.event);
            }
        }
        debug!(event = %self.event, "Subscription removed");
        true
    }

    /// Check if `unsubscribe` has not been called yet.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// The (possibly scoped) event name this subscription listens to.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("entry_id", &self.entry_id)
            .field("active", &self.is_active())
            .finish()
    }
}
