//! # Scoped Event Bus
//!
//! A per-feature view of the shared bus.
//!
//! Local names are rewritten to `@<scope>/<name>` so two features can both
//! emit `ready` without colliding. `emit_global` / `on_global` skip the
//! rewrite for deliberate cross-feature traffic. Names that already start
//! with `@` are never prefixed a second time.
//!
//! The wrapper also owns every subscription it creates: `set_active(false)`
//! silences them without unsubscribing, `dispose()` removes them all.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, trace};

use crate::error::BusError;
use crate::events::scoped_name;
use crate::publisher::{EmitReceipt, EventPublisher, InMemoryEventBus, MessageMeta, TraceMeta};
use crate::subscriber::{EventSubscriber, Handler, SubscribeOptions, Subscription};

/// Namespacing wrapper around a shared `InMemoryEventBus`.
pub struct ScopedEventBus {
    scope: String,
    bus: Arc<InMemoryEventBus>,
    subscriptions: Mutex<Vec<Subscription>>,
    active: Arc<AtomicBool>,
}

impl ScopedEventBus {
    /// Bind `scope` to the shared bus.
    #[must_use]
    pub fn new(scope: impl Into<String>, bus: Arc<InMemoryEventBus>) -> Self {
        Self {
            scope: scope.into(),
            bus,
            subscriptions: Mutex::new(Vec::new()),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The scope name.
    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// The shared bus behind this wrapper.
    #[must_use]
    pub fn global(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    /// Full name a local event is published under.
    #[must_use]
    pub fn scoped_name(&self, local: &str) -> String {
        scoped_name(&self.scope, local)
    }

    /// Publish a global (unscoped) event.
    pub fn emit_global(&self, event: &str, payload: Value) -> Result<Option<EmitReceipt>, BusError> {
        self.emit_global_with_meta(event, payload, MessageMeta::default())
    }

    /// Publish a global event with metadata. The scope is the default actor.
    pub fn emit_global_with_meta(
        &self,
        event: &str,
        payload: Value,
        meta: MessageMeta,
    ) -> Result<Option<EmitReceipt>, BusError> {
        self.bus
            .emit_with_meta(event, payload, meta.or_actor(&self.scope))
    }

    /// Subscribe to a global (unscoped) event.
    pub fn on_global<F>(&self, event: &str, handler: F) -> Result<Subscription, BusError>
    where
        F: Fn(&Value, &TraceMeta) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_global_with(event, SubscribeOptions::default(), handler)
    }

    /// Subscribe to a global event with options.
    pub fn on_global_with<F>(
        &self,
        event: &str,
        options: SubscribeOptions,
        handler: F,
    ) -> Result<Subscription, BusError>
    where
        F: Fn(&Value, &TraceMeta) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.track(event, options, Arc::new(handler))
    }

    /// Silence (or resume) every handler registered through this wrapper.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
        debug!(scope = %self.scope, active, "Scoped bus activity changed");
    }

    /// Whether handlers registered here currently receive messages.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Number of live subscriptions created through this wrapper.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.subscriptions()
            .iter()
            .filter(|sub| sub.is_active())
            .count()
    }

    /// Unsubscribe everything registered through this wrapper.
    ///
    /// Returns the number of subscriptions removed.
    pub fn dispose(&self) -> usize {
        let drained: Vec<Subscription> = self.subscriptions().drain(..).collect();
        let removed = drained.iter().filter(|sub| sub.unsubscribe()).count();
        debug!(scope = %self.scope, removed, "Scoped bus disposed");
        removed
    }

    /// Register `handler` on the shared bus behind the activity switch.
    fn track(
        &self,
        event: &str,
        options: SubscribeOptions,
        handler: Handler,
    ) -> Result<Subscription, BusError> {
        let active = Arc::clone(&self.active);
        let scope = self.scope.clone();
        let gated: Handler = Arc::new(move |payload: &Value, meta: &TraceMeta| {
            if !active.load(Ordering::Acquire) {
                trace!(scope = %scope, event = %meta.event, "Skipped delivery to inactive scope");
                return Ok(());
            }
            handler(payload, meta)
        });

        let subscription = self.bus.subscribe_handler(event, options, gated)?;
        let mut subs = self.subscriptions();
        subs.retain(Subscription::is_active);
        subs.push(subscription.clone());
        Ok(subscription)
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventPublisher for ScopedEventBus {
    /// Publish a local event under this scope.
    fn emit_with_meta(
        &self,
        event: &str,
        payload: Value,
        meta: MessageMeta,
    ) -> Result<Option<EmitReceipt>, BusError> {
        self.bus
            .emit_with_meta(&self.scoped_name(event), payload, meta.or_actor(&self.scope))
    }
}

impl EventSubscriber for ScopedEventBus {
    /// Subscribe to a local event under this scope.
    fn subscribe_handler(
        &self,
        event: &str,
        options: SubscribeOptions,
        handler: Handler,
    ) -> Result<Subscription, BusError> {
        self.track(&self.scoped_name(event), options, handler)
    }
}

impl std::fmt::Debug for ScopedEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedEventBus")
            .field("scope", &self.scope)
            .field("active", &self.is_active())
            .finish()
    }
}
