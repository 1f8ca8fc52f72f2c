//! # Bus Configuration
//!
//! Validation mode and tracing limits, loadable from the environment.

use std::env;
use std::str::FromStr;

use crate::{DEFAULT_MAX_EMIT_DEPTH, DEFAULT_MAX_TRACE_SIZE};

/// How the bus treats event names missing from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Reject unknown global events with `BusError::UnknownEvent`.
    Strict,
    /// Log a warning and continue.
    Permissive,
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "permissive" | "warn" => Ok(Self::Permissive),
            other => Err(format!("unknown validation mode '{}'", other)),
        }
    }
}

/// Configuration for an `InMemoryEventBus`.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Name validation behaviour.
    pub validation: ValidationMode,

    /// Whether every emit is recorded by the message tracer.
    pub tracing_enabled: bool,

    /// Ring buffer capacity of the message tracer.
    pub max_trace_size: usize,

    /// Maximum nesting of re-entrant emits on one thread.
    pub max_emit_depth: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            validation: ValidationMode::Strict,
            tracing_enabled: true,
            max_trace_size: DEFAULT_MAX_TRACE_SIZE,
            max_emit_depth: DEFAULT_MAX_EMIT_DEPTH,
        }
    }
}

impl BusConfig {
    /// Permissive configuration, used by tests and development builds.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            validation: ValidationMode::Permissive,
            ..Self::default()
        }
    }

    /// Builder-style override of the validation mode.
    #[must_use]
    pub fn with_validation(mut self, validation: ValidationMode) -> Self {
        self.validation = validation;
        self
    }

    /// Builder-style override of the tracing switch.
    #[must_use]
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.tracing_enabled = enabled;
        self
    }

    /// Builder-style override of the trace buffer capacity.
    #[must_use]
    pub fn with_max_trace_size(mut self, size: usize) -> Self {
        self.max_trace_size = size;
        self
    }

    /// Builder-style override of the emit depth guard.
    #[must_use]
    pub fn with_max_emit_depth(mut self, depth: usize) -> Self {
        self.max_emit_depth = depth;
        self
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `PLEXUS_BUS_VALIDATION`: `strict` or `permissive` (default: strict)
    /// - `PLEXUS_BUS_TRACING`: Enable message tracing (default: true)
    /// - `PLEXUS_BUS_MAX_TRACE_SIZE`: Trace ring capacity (default: 1000)
    /// - `PLEXUS_BUS_MAX_EMIT_DEPTH`: Re-entrant emit limit (default: 64)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            validation: env::var("PLEXUS_BUS_VALIDATION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.validation),

            tracing_enabled: env::var("PLEXUS_BUS_TRACING")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.tracing_enabled),

            max_trace_size: env::var("PLEXUS_BUS_MAX_TRACE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|size| *size > 0)
                .unwrap_or(defaults.max_trace_size),

            max_emit_depth: env::var("PLEXUS_BUS_MAX_EMIT_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|depth| *depth > 0)
                .unwrap_or(defaults.max_emit_depth),
        }
    }
}
