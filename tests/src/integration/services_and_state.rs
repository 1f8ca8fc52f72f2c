//! # Services and State Flows
//!
//! Features resolving shared services from the container, keeping private
//! overrides in their own scope, and publishing state through the bus.
//!
//! ## Container layout exercised:
//!
//! ```text
//! root ── core.bus, core.state, core.flags
//!  ├── feature:autosave
//!  └── feature:themed ── theme (local)
//! ```

#[cfg(test)]
mod tests {
    use std::io::{self, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use anyhow::Context;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use shared_bus::events::{flag, state};
    use shared_bus::{EventPublisher, EventSubscriber, EventTable, TraceMeta};
    use tracing_subscriber::fmt::MakeWriter;

    use feature_runtime::{
        AppRuntime, DependencyContainer, Feature, FeatureContext, FeatureLogger, RuntimeConfig,
        ServiceScope, StateManager, SERVICE_STATE,
    };
    use plexus_telemetry::{build_subscriber, init_test_logging, TelemetryConfig};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const SAVED: &str = "doc:saved";

    const EDITOR_EVENTS: EventTable = EventTable {
        name: "editor",
        events: &[SAVED],
        tables: &[],
    };

    fn runtime() -> AppRuntime {
        init_test_logging();
        let runtime = AppRuntime::new(RuntimeConfig::default()).unwrap();
        runtime.register_events(&EDITOR_EVENTS);
        runtime
    }

    /// Collect every payload published on `event`.
    fn capture(runtime: &AppRuntime, event: &str) -> Arc<Mutex<Vec<Value>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = runtime
            .bus()
            .on(event, move |payload: &Value, _: &TraceMeta| {
                sink.lock().push(payload.clone());
                Ok(())
            })
            .unwrap();
        seen
    }

    /// Registers a theme visible only inside its own scope.
    struct Themed;

    #[async_trait]
    impl Feature for Themed {
        fn name(&self) -> &str {
            "themed"
        }

        async fn install(&self, ctx: &FeatureContext) -> anyhow::Result<()> {
            ctx.container.register_instance("theme", "dark".to_string())?;
            Ok(())
        }
    }

    /// Keeps the path of the last saved document in shared state.
    struct Autosave;

    #[async_trait]
    impl Feature for Autosave {
        fn name(&self) -> &str {
            "autosave"
        }

        async fn install(&self, ctx: &FeatureContext) -> anyhow::Result<()> {
            let states = ctx.container.get::<StateManager>(SERVICE_STATE)?;
            let handle = states.create_state("autosave", json!({ "last": null, "saves": 0 }))?;

            let _sub = ctx.scoped_bus.on_global(SAVED, move |payload: &Value, _: &TraceMeta| {
                let path = payload["path"].as_str().context("save without path")?;
                let saves = handle.get("saves").and_then(|v| v.as_u64()).unwrap_or(0);
                handle.set("last", path);
                handle.set("saves", saves + 1);
                Ok(())
            })?;
            Ok(())
        }

        async fn uninstall(&self, ctx: &FeatureContext) -> anyhow::Result<()> {
            let states = ctx.container.get::<StateManager>(SERVICE_STATE)?;
            states.destroy_state("autosave");
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    // =============================================================================
    // CONTAINER SCOPES
    // =============================================================================

    #[tokio::test]
    async fn test_feature_overrides_stay_in_feature_scope() {
        let runtime = runtime();
        runtime.register(Arc::new(Themed)).unwrap();
        runtime.start().await.unwrap();

        let ctx = runtime.registry().context("themed").unwrap();
        assert_eq!(ctx.container.name(), "feature:themed");
        assert_eq!(*ctx.container.get::<String>("theme").unwrap(), "dark");

        // Core services resolve through the parent.
        assert!(ctx.container.has(SERVICE_STATE));
        assert!(!runtime.container().has("theme"));
        assert!(runtime.container().get::<String>("theme").is_err());
    }

    #[test]
    fn test_singletons_shared_across_scopes_transients_per_request() {
        let root = Arc::new(DependencyContainer::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();

        root.register_factory("index", ServiceScope::Singleton, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Mutex::new(Vec::<String>::new()))
        })
        .unwrap();
        root.register_factory("origin", ServiceScope::Transient, |scope| {
            Ok(scope.name().to_string())
        })
        .unwrap();

        let search = root.create_scope("feature:search");
        let preview = root.create_scope("feature:preview");

        let a = search.get::<Mutex<Vec<String>>>("index").unwrap();
        let b = preview.get::<Mutex<Vec<String>>>("index").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        a.lock().push("readme.md".to_string());
        assert_eq!(b.lock().len(), 1);

        assert_eq!(*search.get::<String>("origin").unwrap(), "feature:search");
        assert_eq!(*preview.get::<String>("origin").unwrap(), "feature:preview");
    }

    // =============================================================================
    // STATE
    // =============================================================================

    #[tokio::test]
    async fn test_state_changes_are_published_on_the_bus() {
        let runtime = runtime();
        let published = capture(&runtime, state::CHANGED);
        let handle = runtime
            .state()
            .create_state("editor", json!({ "dirty": false }))
            .unwrap();

        let local = Arc::new(AtomicUsize::new(0));
        let hits = local.clone();
        let _listener = handle.subscribe(move |_| {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(handle.set("dirty", true));
        assert!(!handle.set("dirty", true));

        assert_eq!(local.load(Ordering::SeqCst), 1);
        let published = published.lock();
        assert_eq!(published.len(), 1);
        assert_eq!(
            published[0],
            json!({
                "state": "editor",
                "field": "dirty",
                "old_value": false,
                "new_value": true,
                "snapshot": { "dirty": true },
            })
        );
    }

    #[tokio::test]
    async fn test_feature_updates_state_from_events() {
        let runtime = runtime();
        runtime.register(Arc::new(Autosave)).unwrap();
        runtime.start().await.unwrap();

        let bus = runtime.bus();
        bus.emit(SAVED, json!({ "path": "notes.md" })).unwrap();
        bus.emit(SAVED, json!({ "path": "todo.md" })).unwrap();

        let handle = runtime.state().get_state("autosave").unwrap();
        assert_eq!(handle.get("last"), Some(json!("todo.md")));
        assert_eq!(handle.get("saves"), Some(json!(2)));

        // A malformed save is a recorded handler failure, not a publisher error.
        let receipt = bus.emit(SAVED, json!({})).unwrap().unwrap();
        let trace = runtime.tracer().unwrap().get_trace(&receipt.message_id).unwrap();
        assert_eq!(trace.failure_count(), 1);

        runtime.shutdown().await.unwrap();
        assert!(runtime.state().get_state("autosave").is_none());
    }

    #[tokio::test]
    async fn test_flag_changes_are_published_once() {
        let runtime = runtime();
        let published = capture(&runtime, flag::CHANGED);

        assert!(runtime.flags().enable("beta"));
        assert!(!runtime.flags().enable("beta"));
        assert!(runtime.flags().disable("beta"));

        assert_eq!(
            *published.lock(),
            vec![
                json!({ "flag": "beta", "enabled": true }),
                json!({ "flag": "beta", "enabled": false }),
            ]
        );
    }

    // =============================================================================
    // LOGGING
    // =============================================================================

    #[test]
    fn test_feature_logger_records_carry_feature_field() {
        let buffer = Buffer::default();
        let config = TelemetryConfig {
            json_logs: true,
            ..TelemetryConfig::default()
        };
        let subscriber = build_subscriber(&config, buffer.clone()).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            FeatureLogger::new("autosave").info("state restored");
        });

        let output = String::from_utf8(buffer.0.lock().clone()).unwrap();
        let record: Value = serde_json::from_str(output.lines().last().unwrap()).unwrap();
        assert_eq!(record["fields"]["feature"], "autosave");
        assert_eq!(record["fields"]["message"], "state restored");
    }
}
