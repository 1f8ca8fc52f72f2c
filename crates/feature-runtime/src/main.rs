//! # Plexus Feature Host
//!
//! Minimal host process: assembles an `AppRuntime`, installs the built-in
//! diagnostics feature and runs until Ctrl+C.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`PLEXUS_LOG_LEVEL`, `PLEXUS_JSON_LOGS`)
//! 2. Load and validate `RuntimeConfig` (`PLEXUS_BUS_*`, `PLEXUS_FLAG_*`)
//! 3. Register features, install in dependency order, enable
//! 4. Wait for Ctrl+C, then uninstall in reverse order

use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use async_trait::async_trait;
use feature_runtime::{AppRuntime, Feature, FeatureContext, RuntimeConfig};
use plexus_telemetry::{init_telemetry, log_bus_event, TelemetryConfig};
use serde_json::{json, Value};
use shared_bus::{EventPublisher, EventTable, InMemoryEventBus, TraceMeta};
use tracing::{error, info, warn};

/// Ask the diagnostics feature for a trace summary. Payload: `{ "limit": n }`.
const DUMP_EVENT: &str = "diagnostics:dump";
/// Trace summary published in response to `diagnostics:dump`.
const REPORT_EVENT: &str = "diagnostics:report";

const HOST_EVENTS: EventTable = EventTable {
    name: "diagnostics",
    events: &[DUMP_EVENT, REPORT_EVENT],
    tables: &[],
};

/// Summarizes recent bus traffic on request.
struct Diagnostics;

#[async_trait]
impl Feature for Diagnostics {
    fn name(&self) -> &str {
        "diagnostics"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn install(&self, ctx: &FeatureContext) -> anyhow::Result<()> {
        let tracer = ctx.global_bus.tracer();
        // Weak: the bus owns this handler.
        let bus: Weak<InMemoryEventBus> = Arc::downgrade(&ctx.global_bus);
        let logger = ctx.logger.clone();

        let _dump = ctx.scoped_bus.on_global(DUMP_EVENT, move |payload: &Value, meta: &TraceMeta| {
            let Some(tracer) = &tracer else {
                anyhow::bail!("message tracing is disabled");
            };
            let Some(bus) = bus.upgrade() else {
                return Ok(());
            };

            let limit = payload.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;
            let recent: Vec<Value> = tracer
                .recent(limit)
                .into_iter()
                .map(|trace| {
                    json!({
                        "event": trace.event,
                        "subscribers": trace.subscribers.len(),
                        "failures": trace.failure_count(),
                        "ms": trace.total_execution_ms,
                    })
                })
                .collect();

            logger.info(&format!("{} traced messages, reporting {}", tracer.len(), recent.len()));
            bus.emit_with_meta(
                REPORT_EVENT,
                json!({ "traced": tracer.len(), "recent": recent }),
                meta.child_as("diagnostics"),
            )?;
            Ok(())
        })?;

        log_bus_event!(debug, "diagnostics", "Listening for dump requests", DUMP_EVENT);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::for_component("host"))
        .context("Failed to initialize logging")?;

    // Load configuration
    let config = RuntimeConfig::from_env();
    config.validate().context("Invalid runtime configuration")?;
    if let Err(e) = config.validate_for_production() {
        warn!("{}", e);
    }

    let runtime = AppRuntime::new(config).context("Failed to assemble runtime")?;
    runtime.register_events(&HOST_EVENTS);
    runtime.register(Arc::new(Diagnostics))?;

    info!("===========================================");
    info!("  Plexus Feature Host v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let report = runtime.start().await?;
    info!(
        installed = report.installed.len(),
        skipped = report.skipped.len(),
        "Features started"
    );
    runtime.registry().print_status();
    runtime.bus().emit(DUMP_EVENT, json!({ "limit": 10 }))?;

    // Keep the host running
    info!("Host is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    // Graceful shutdown
    if let Err(errors) = runtime.shutdown().await {
        for e in errors {
            error!("Shutdown: {}", e);
        }
    }

    Ok(())
}
