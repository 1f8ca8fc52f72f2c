//! # Event Publisher
//!
//! Defines the publishing side of the event bus and the in-memory bus itself.
//!
//! ## Dispatch
//!
//! `emit` runs synchronously on the caller's thread. It takes a snapshot of
//! the handlers registered for the event, releases the registry lock and
//! invokes each handler in registration order. Handlers may subscribe,
//! unsubscribe or emit again; those changes only affect later dispatches.
//!
//! Every handler call is isolated: an `Err` or a panic is logged and recorded
//! as a failed `SubscriberResult`, and delivery continues with the next
//! handler.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::config::{BusConfig, ValidationMode};
use crate::error::BusError;
use crate::events::{check_event_name, EventCatalog, EventTable};
use crate::subscriber::{
    EventSubscriber, Handler, SubscribeOptions, SubscriberEntry, SubscriberMap, Subscription,
};
use crate::tracer::{MessageId, MessageTrace, MessageTracer, SubscriberResult};

thread_local! {
    static EMIT_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Publisher-supplied metadata for one emit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMeta {
    /// Actor (feature or component) publishing the message.
    pub actor_id: Option<String>,
    /// Trace the message belongs to; `None` starts a new trace.
    pub parent_trace_id: Option<MessageId>,
    /// Message that caused this one.
    pub parent_message_id: Option<MessageId>,
}

impl MessageMeta {
    /// Metadata naming only the publishing actor.
    #[must_use]
    pub fn actor(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: Some(actor_id.into()),
            ..Self::default()
        }
    }

    /// Set the publishing actor if none is set yet.
    #[must_use]
    pub fn or_actor(mut self, actor_id: &str) -> Self {
        if self.actor_id.is_none() {
            self.actor_id = Some(actor_id.to_string());
        }
        self
    }
}

/// Metadata handed to a handler about the message being delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceMeta {
    pub event: String,
    /// `None` when tracing is disabled.
    pub message_id: Option<MessageId>,
    /// `None` when tracing is disabled.
    pub trace_id: Option<MessageId>,
    pub actor_id: Option<String>,
    /// Emit nesting depth on this thread (1 for a top-level emit).
    pub depth: usize,
}

impl TraceMeta {
    /// Metadata for an emit caused by this message.
    #[must_use]
    pub fn child(&self) -> MessageMeta {
        MessageMeta {
            actor_id: None,
            parent_trace_id: self.trace_id.clone(),
            parent_message_id: self.message_id.clone(),
        }
    }

    /// Same as `child`, naming the publishing actor.
    #[must_use]
    pub fn child_as(&self, actor_id: impl Into<String>) -> MessageMeta {
        MessageMeta {
            actor_id: Some(actor_id.into()),
            ..self.child()
        }
    }
}

/// Identifiers of a traced emit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmitReceipt {
    pub message_id: MessageId,
    pub trace_id: MessageId,
    /// Number of handlers the message was delivered to (failed ones included).
    pub delivered: usize,
}

/// Trait for publishing events to a bus.
pub trait EventPublisher: Send + Sync {
    /// Publish with explicit metadata.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(receipt))` - delivered and traced
    /// - `Ok(None)` - delivered, tracing disabled
    /// - `Err(_)` - rejected before any handler ran
    fn emit_with_meta(
        &self,
        event: &str,
        payload: Value,
        meta: MessageMeta,
    ) -> Result<Option<EmitReceipt>, BusError>;

    /// Publish with default metadata (starts a new trace).
    fn emit(&self, event: &str, payload: Value) -> Result<Option<EmitReceipt>, BusError> {
        self.emit_with_meta(event, payload, MessageMeta::default())
    }
}

/// Tracks emit nesting on the current thread.
struct DepthGuard {
    depth: usize,
}

impl DepthGuard {
    fn enter(event: &str, max_depth: usize) -> Result<Self, BusError> {
        let depth = EMIT_DEPTH.with(|d| d.get()) + 1;
        if depth > max_depth {
            return Err(BusError::RecursionLimit {
                event: event.to_string(),
                depth: max_depth,
            });
        }
        EMIT_DEPTH.with(|d| d.set(depth));
        Ok(Self { depth })
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        EMIT_DEPTH.with(|d| d.set(self.depth - 1));
    }
}

/// In-memory implementation of the event bus.
///
/// Shared by reference (`Arc<InMemoryEventBus>`) between every feature of the
/// process; constructed once by the runtime.
pub struct InMemoryEventBus {
    /// Handlers by event name.
    subscribers: Arc<RwLock<SubscriberMap>>,

    /// Whitelist of global event names.
    catalog: RwLock<EventCatalog>,

    /// Validation and tracing settings.
    config: BusConfig,

    /// Present when tracing is enabled.
    tracer: Option<Arc<MessageTracer>>,

    /// Source of subscriber registration order.
    next_subscriber_id: AtomicU64,

    /// Total events accepted for dispatch.
    events_published: AtomicU64,
}

impl InMemoryEventBus {
    /// Create a strict, traced bus with the core event catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// Create a bus with the core event catalog.
    #[must_use]
    pub fn with_config(config: BusConfig) -> Self {
        Self::with_catalog(config, EventCatalog::core())
    }

    /// Create a bus with an explicit catalog.
    #[must_use]
    pub fn with_catalog(config: BusConfig, catalog: EventCatalog) -> Self {
        let tracer = config
            .tracing_enabled
            .then(|| Arc::new(MessageTracer::with_capacity(config.max_trace_size)));

        Self {
            subscribers: Arc::new(RwLock::new(SubscriberMap::new())),
            catalog: RwLock::new(catalog),
            config,
            tracer,
            next_subscriber_id: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
        }
    }

    /// Add an event table (recursively) to the catalog.
    pub fn register_events(&self, table: &EventTable) {
        let mut catalog = self.catalog.write().unwrap_or_else(|e| e.into_inner());
        table.for_each_event(&mut |event| catalog.insert(event));
    }

    /// Check if a name passes catalog validation.
    #[must_use]
    pub fn is_known_event(&self, event: &str) -> bool {
        self.catalog
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .allows(event)
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Get the message tracer, if tracing is enabled.
    #[must_use]
    pub fn tracer(&self) -> Option<Arc<MessageTracer>> {
        self.tracer.clone()
    }

    /// Number of handlers registered for an event.
    #[must_use]
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Check if any handler listens to an event.
    #[must_use]
    pub fn has_subscribers(&self, event: &str) -> bool {
        self.subscriber_count(event) > 0
    }

    /// Event names with at least one handler, sorted.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Get the total number of events published.
    #[must_use]
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    /// Remove every handler. Outstanding `Subscription`s become no-ops.
    pub fn clear(&self) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        debug!("All subscriptions cleared");
    }

    /// Apply name validation according to the configured mode.
    fn validate(&self, event: &str) -> Result<(), BusError> {
        check_event_name(event)?;
        if self.is_known_event(event) {
            return Ok(());
        }

        match self.config.validation {
            ValidationMode::Strict => Err(BusError::UnknownEvent {
                event: event.to_string(),
            }),
            ValidationMode::Permissive => {
                warn!(event = %event, "Unknown global event (permissive mode)");
                Ok(())
            }
        }
    }

    fn snapshot(&self, event: &str) -> Vec<Arc<SubscriberEntry>> {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event)
            .cloned()
            .unwrap_or_default()
    }

    fn deliver(entry: &SubscriberEntry, payload: &Value, meta: &TraceMeta) -> SubscriberResult {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (entry.handler)(payload, meta)));
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{:#}", e)),
            Err(panic) => Some(panic_message(panic.as_ref())),
        };

        if let Some(err) = &error {
            error!(
                event = %meta.event,
                subscriber_id = ?entry.subscriber_id,
                message_id = ?meta.message_id,
                error = %err,
                "Subscriber failed"
            );
        }

        SubscriberResult {
            subscriber_id: entry.subscriber_id.clone(),
            success: error.is_none(),
            duration_ms,
            error,
        }
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("validation", &self.config.validation)
            .field("tracing", &self.tracer.is_some())
            .field("events_published", &self.events_published())
            .finish()
    }
}

impl EventPublisher for InMemoryEventBus {
    fn emit_with_meta(
        &self,
        event: &str,
        payload: Value,
        meta: MessageMeta,
    ) -> Result<Option<EmitReceipt>, BusError> {
        self.validate(event)?;
        let guard = DepthGuard::enter(event, self.config.max_emit_depth).inspect_err(|_| {
            warn!(event = %event, max_depth = self.config.max_emit_depth, "Emit depth limit reached");
        })?;

        self.events_published.fetch_add(1, Ordering::Relaxed);
        let handlers = self.snapshot(event);

        let ids = self.tracer.as_ref().map(|tracer| {
            let message_id = tracer.generate_message_id();
            let trace_id = meta
                .parent_trace_id
                .clone()
                .unwrap_or_else(|| message_id.clone());
            (message_id, trace_id)
        });

        let trace_meta = TraceMeta {
            event: event.to_string(),
            message_id: ids.as_ref().map(|(m, _)| m.clone()),
            trace_id: ids.as_ref().map(|(_, t)| t.clone()),
            actor_id: meta.actor_id.clone(),
            depth: guard.depth,
        };

        let timestamp_ms = MessageTracer::current_timestamp_ms();
        let started = Instant::now();
        let results: Vec<SubscriberResult> = handlers
            .iter()
            .map(|entry| Self::deliver(entry, &payload, &trace_meta))
            .collect();
        let total_execution_ms = started.elapsed().as_secs_f64() * 1000.0;

        trace!(
            event = %event,
            actor = ?meta.actor_id,
            receivers = results.len(),
            depth = guard.depth,
            "Event dispatched"
        );

        let delivered = results.len();
        let (Some(tracer), Some((message_id, trace_id))) = (self.tracer.as_ref(), ids) else {
            return Ok(None);
        };

        tracer.record_message(MessageTrace {
            sequence: 0,
            message_id: message_id.clone(),
            trace_id: trace_id.clone(),
            event: event.to_string(),
            publisher_id: meta.actor_id,
            subscribers: results,
            total_execution_ms,
            parent_message_id: meta.parent_message_id,
            parent_trace_id: meta.parent_trace_id,
            timestamp_ms,
        });

        Ok(Some(EmitReceipt {
            message_id,
            trace_id,
            delivered,
        }))
    }
}

impl EventSubscriber for InMemoryEventBus {
    fn subscribe_handler(
        &self,
        event: &str,
        options: SubscribeOptions,
        handler: Handler,
    ) -> Result<Subscription, BusError> {
        self.validate(event)?;

        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(SubscriberEntry {
            id,
            subscriber_id: options.subscriber_id,
            handler,
        });

        {
            let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
            subs.entry(event.to_string()).or_default().push(entry);
        }

        debug!(event = %event, entry_id = id, "New subscription created");

        Ok(Subscription::new(
            event.to_string(),
            id,
            Arc::downgrade(&self.subscribers),
        ))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("panic: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("panic: {}", msg)
    } else {
        "panic: <non-string payload>".to_string()
    }
}
