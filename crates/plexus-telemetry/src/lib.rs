//! # Plexus Telemetry
//!
//! Structured logging setup shared by every Plexus binary and test.
//!
//! ## Components
//!
//! - **Filter**: `EnvFilter` directives from `PLEXUS_LOG_LEVEL` / `RUST_LOG`
//! - **Output**: pretty `fmt` layer for terminals, JSON lines for shippers
//! - **Macros**: `log_event!`, `log_bus_event!` and `feature_span!` stamp the
//!   `feature` field
//!
//! ## Usage
//!
//! ```rust,ignore
//! use plexus_telemetry::{TelemetryConfig, init_telemetry};
//!
//! fn main() {
//!     let config = TelemetryConfig::from_env();
//!     let _guard = init_telemetry(config).expect("Failed to init telemetry");
//!
//!     // Your application code here
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `plexus` | Service name in startup records |
//! | `PLEXUS_LOG_LEVEL` | `info` | Log filter (falls back to `RUST_LOG`) |
//! | `PLEXUS_CONSOLE_OUTPUT` | `true` | Write records to stdout |
//! | `PLEXUS_JSON_LOGS` | `false` (`true` in containers) | JSON output |

mod config;
mod logging;
mod tracing_setup;

pub use config::{TelemetryConfig, DEFAULT_SERVICE_NAME};
pub use tracing_setup::{build_subscriber, init_test_logging, BoxedSubscriber};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install log subscriber: {0}")]
    SubscriberInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install the global log subscriber.
///
/// Returns a guard that should be held for the lifetime of the application.
/// Fails if a global subscriber is already installed.
///
/// # Example
///
/// ```rust,ignore
/// let config = TelemetryConfig::from_env();
/// let _guard = init_telemetry(config)?;
///
/// // Application runs here...
/// ```
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    tracing_setup::init_tracing(&config)?;
    Ok(TelemetryGuard {
        service: config.full_service_name(),
    })
}

/// Guard that marks the logging lifetime of the application.
pub struct TelemetryGuard {
    service: String,
}

impl TelemetryGuard {
    /// Service name the guard was created for.
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service, "Shutting down telemetry...");
    }
}

/// Convenience macro for creating a span with feature context.
///
/// # Example
///
/// ```rust,ignore
/// use plexus_telemetry::feature_span;
///
/// fn rebuild_index() {
///     let _span = feature_span!("rebuild_index", feature = "search", documents = 12).entered();
///     // ... indexing logic
/// }
/// ```
#[macro_export]
macro_rules! feature_span {
    ($name:expr, $($field:tt)*) => {
        tracing::info_span!($name, $($field)*)
    };
}
