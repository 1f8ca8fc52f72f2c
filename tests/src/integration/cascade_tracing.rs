//! # Cascade Tracing Flows
//!
//! Features reacting to each other through the shared bus, and the tracer
//! reconstructing who caused what.
//!
//! ## Flow Tested:
//!
//! ```text
//! shell ──doc:opened──► indexer ──doc:indexed──► thumbs ──doc:thumbnail──► (listeners)
//! ```
//!
//! Every hop passes `TraceMeta::child_as`, so all three messages share the
//! root's trace id and form a single three-level tree.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Weak};

    use anyhow::Context;
    use serde_json::{json, Value};
    use shared_bus::{
        BusConfig, BusError, EventCatalog, EventPublisher, EventSubscriber, EventTable,
        InMemoryEventBus, MessageMeta, ScopedEventBus, SubscribeOptions, TraceMeta,
    };

    use crate::fixtures::app_bus;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const OPENED: &str = "doc:opened";
    const INDEXED: &str = "doc:indexed";
    const THUMBNAIL: &str = "doc:thumbnail";
    const AUDIT: &str = "doc:audit";

    const DOC_EVENTS: EventTable = EventTable {
        name: "doc",
        events: &[OPENED, INDEXED, THUMBNAIL, AUDIT],
        tables: &[],
    };

    /// Re-publish `next` as a child of every `event` the scope sees.
    fn relay(scope: &ScopedEventBus, event: &str, next: &'static str) {
        let bus: Weak<InMemoryEventBus> = Arc::downgrade(scope.global());
        let actor = scope.scope().to_string();
        let _sub = scope
            .on_global(event, move |payload: &Value, meta: &TraceMeta| {
                let bus = bus.upgrade().context("bus dropped")?;
                bus.emit_with_meta(next, payload.clone(), meta.child_as(actor.as_str()))?;
                Ok(())
            })
            .unwrap();
    }

    // =============================================================================
    // CASCADES
    // =============================================================================

    #[test]
    fn test_three_level_cascade_forms_one_tree() {
        let bus = app_bus(&DOC_EVENTS);
        let indexer = ScopedEventBus::new("indexer", bus.clone());
        let thumbs = ScopedEventBus::new("thumbs", bus.clone());
        relay(&indexer, OPENED, INDEXED);
        relay(&thumbs, INDEXED, THUMBNAIL);

        let depth_seen = Arc::new(AtomicUsize::new(0));
        let seen = depth_seen.clone();
        let _leaf = bus
            .on(THUMBNAIL, move |_: &Value, meta: &TraceMeta| {
                seen.store(meta.depth, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        let receipt = bus
            .emit_with_meta(OPENED, json!({ "id": 7 }), MessageMeta::actor("shell"))
            .unwrap()
            .unwrap();
        assert_eq!(receipt.trace_id, receipt.message_id);
        assert_eq!(depth_seen.load(Ordering::SeqCst), 3);

        let tracer = bus.tracer().unwrap();
        let roots = tracer.get_trace_tree(&receipt.trace_id);
        assert_eq!(roots.len(), 1);

        let root = &roots[0];
        assert_eq!(root.trace.event, OPENED);
        assert_eq!(root.trace.publisher_id.as_deref(), Some("shell"));
        assert_eq!(root.len(), 3);
        assert_eq!(root.depth(), 3);

        let child = &root.children[0];
        assert_eq!(child.trace.event, INDEXED);
        assert_eq!(child.trace.publisher_id.as_deref(), Some("indexer"));
        assert_eq!(child.trace.parent_message_id.as_ref(), Some(&receipt.message_id));

        let grandchild = &child.children[0];
        assert_eq!(grandchild.trace.event, THUMBNAIL);
        assert_eq!(grandchild.trace.publisher_id.as_deref(), Some("thumbs"));
        assert_eq!(grandchild.trace.trace_id, receipt.trace_id);
        assert!(root.find(&grandchild.trace.message_id).is_some());
    }

    #[test]
    fn test_independent_emits_start_separate_traces() {
        let bus = app_bus(&DOC_EVENTS);
        let first = bus.emit(OPENED, json!({ "id": 1 })).unwrap().unwrap();
        let second = bus.emit(OPENED, json!({ "id": 2 })).unwrap().unwrap();

        assert_ne!(first.trace_id, second.trace_id);
        assert!(first.message_id.as_str().starts_with("msg_"));

        let tracer = bus.tracer().unwrap();
        assert_eq!(tracer.get_trace_tree(&first.trace_id).len(), 1);
        assert_eq!(tracer.get_stats(OPENED).count, 2);
    }

    #[test]
    fn test_runaway_cascade_stops_at_depth_limit() {
        let config = BusConfig::default().with_max_emit_depth(4);
        let bus = Arc::new(InMemoryEventBus::with_catalog(
            config,
            EventCatalog::core().with_table(&DOC_EVENTS),
        ));
        let weak = Arc::downgrade(&bus);
        let _echo = bus
            .on(OPENED, move |payload: &Value, meta: &TraceMeta| {
                let bus = weak.upgrade().context("bus dropped")?;
                bus.emit_with_meta(OPENED, payload.clone(), meta.child())?;
                Ok(())
            })
            .unwrap();

        let receipt = bus.emit(OPENED, json!(null)).unwrap().unwrap();

        let tracer = bus.tracer().unwrap();
        let roots = tracer.get_trace_tree(&receipt.trace_id);
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].depth(), 4);

        // Only the innermost handler saw the depth error.
        let stats = tracer.get_stats(OPENED);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.failures, 1);

        // The thread's nesting counter is back to zero.
        assert!(bus.emit(AUDIT, json!(null)).is_ok());
    }

    // =============================================================================
    // FAULT ISOLATION
    // =============================================================================

    #[test]
    fn test_failing_subscribers_are_recorded_not_propagated() {
        let bus = app_bus(&DOC_EVENTS);
        let steady_hits = Arc::new(AtomicUsize::new(0));
        let hits = steady_hits.clone();

        let _flaky = bus
            .on_with(AUDIT, SubscribeOptions::id("flaky"), |_: &Value, _: &TraceMeta| {
                anyhow::bail!("disk full")
            })
            .unwrap();
        let _crashy = bus
            .on_with(AUDIT, SubscribeOptions::id("crashy"), |_: &Value, _: &TraceMeta| {
                panic!("boom")
            })
            .unwrap();
        let _steady = bus
            .on_with(AUDIT, SubscribeOptions::id("steady"), move |_: &Value, _: &TraceMeta| {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        let receipt = bus.emit(AUDIT, json!({ "entry": 1 })).unwrap().unwrap();
        assert_eq!(receipt.delivered, 3);
        assert_eq!(steady_hits.load(Ordering::SeqCst), 1);

        let trace = bus.tracer().unwrap().get_trace(&receipt.message_id).unwrap();
        assert_eq!(trace.failure_count(), 2);

        let outcomes: Vec<(Option<&str>, bool)> = trace
            .subscribers
            .iter()
            .map(|r| (r.subscriber_id.as_deref(), r.success))
            .collect();
        assert_eq!(
            outcomes,
            vec![(Some("flaky"), false), (Some("crashy"), false), (Some("steady"), true)]
        );
        assert!(trace.subscribers[0].error.as_deref().unwrap().contains("disk full"));
        assert!(trace.subscribers[1].error.as_deref().unwrap().contains("boom"));
    }

    // =============================================================================
    // NAMESPACING
    // =============================================================================

    #[test]
    fn test_scoped_events_stay_inside_their_feature() {
        let bus = app_bus(&DOC_EVENTS);
        let indexer = ScopedEventBus::new("indexer", bus.clone());
        let thumbs = ScopedEventBus::new("thumbs", bus.clone());

        let indexer_hits = Arc::new(AtomicUsize::new(0));
        let thumbs_hits = Arc::new(AtomicUsize::new(0));
        let (a, b) = (indexer_hits.clone(), thumbs_hits.clone());
        let _a = indexer
            .on("ready", move |_: &Value, _: &TraceMeta| {
                a.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        let _b = thumbs
            .on("ready", move |_: &Value, _: &TraceMeta| {
                b.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        let receipt = indexer.emit("ready", json!(null)).unwrap().unwrap();
        assert_eq!(indexer_hits.load(Ordering::SeqCst), 1);
        assert_eq!(thumbs_hits.load(Ordering::SeqCst), 0);

        let trace = bus.tracer().unwrap().get_trace(&receipt.message_id).unwrap();
        assert_eq!(trace.event, "@indexer/ready");
        assert_eq!(trace.publisher_id.as_deref(), Some("indexer"));
    }

    #[test]
    fn test_strict_bus_rejects_unlisted_global_events() {
        let bus = app_bus(&DOC_EVENTS);
        let indexer = ScopedEventBus::new("indexer", bus.clone());

        assert!(matches!(
            bus.emit("doc:deleted", json!(null)),
            Err(BusError::UnknownEvent { .. })
        ));
        assert!(matches!(
            indexer.on_global("doc:deleted", |_: &Value, _: &TraceMeta| Ok(())),
            Err(BusError::UnknownEvent { .. })
        ));
        assert!(indexer.emit("progress", json!(50)).is_ok());
        assert_eq!(bus.tracer().unwrap().get_stats("doc:deleted").count, 0);
    }

    #[test]
    fn test_disposing_a_scope_detaches_only_its_handlers() {
        let bus = app_bus(&DOC_EVENTS);
        let indexer = ScopedEventBus::new("indexer", bus.clone());
        let thumbs = ScopedEventBus::new("thumbs", bus.clone());
        relay(&indexer, OPENED, INDEXED);
        let _keep = thumbs
            .on_global(OPENED, |_: &Value, _: &TraceMeta| Ok(()))
            .unwrap();
        assert_eq!(bus.subscriber_count(OPENED), 2);

        assert_eq!(indexer.dispose(), 1);
        assert_eq!(bus.subscriber_count(OPENED), 1);

        let receipt = bus.emit(OPENED, json!(null)).unwrap().unwrap();
        assert_eq!(receipt.delivered, 1);
        assert_eq!(bus.tracer().unwrap().get_stats(INDEXED).count, 0);
    }
}
