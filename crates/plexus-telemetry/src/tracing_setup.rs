//! Subscriber setup.
//!
//! One `EnvFilter` in front of either a pretty or a JSON `fmt` layer. JSON
//! output is meant for log shippers; pretty output for terminals.

use tracing::Subscriber;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::{TelemetryConfig, TelemetryError};

/// Type-erased subscriber produced by `build_subscriber`.
pub type BoxedSubscriber = Box<dyn Subscriber + Send + Sync + 'static>;

/// Build the subscriber described by `config`, writing to `writer`.
pub fn build_subscriber<W>(config: &TelemetryConfig, writer: W) -> Result<BoxedSubscriber, TelemetryError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(format!("log level '{}': {}", config.log_level, e)))?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let subscriber: BoxedSubscriber = if !config.console_output {
        Box::new(registry)
    } else if config.json_logs {
        // JSON output for containers/production
        let json_layer = fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_current_span(true);
        Box::new(registry.with(json_layer))
    } else {
        // Pretty output for development
        let fmt_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true);
        Box::new(registry.with(fmt_layer))
    };

    Ok(subscriber)
}

/// Install the stdout subscriber as the global default.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let subscriber = build_subscriber(config, std::io::stdout)?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(
        service = %config.full_service_name(),
        json = config.json_logs,
        filter = %config.log_level,
        "Logging initialized"
    );
    Ok(())
}

/// Route logs through the test harness writer. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}
