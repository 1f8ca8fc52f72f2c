//! # Runtime Configuration
//!
//! Unified configuration for the bus and the feature host.
//!
//! ## Production Requirements
//!
//! - Global event names MUST be validated strictly in production
//! - Trace buffer and emit depth limits MUST be non-zero

use shared_bus::{BusConfig, ValidationMode};

/// Default environment prefix for feature flags.
pub const DEFAULT_FLAG_PREFIX: &str = "PLEXUS_FLAG_";

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Event bus configuration.
    pub bus: BusConfig,
    /// Environment prefix feature flags are loaded from.
    pub flag_prefix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            flag_prefix: DEFAULT_FLAG_PREFIX.to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Load from environment variables.
    ///
    /// The bus reads `PLEXUS_BUS_*`; `PLEXUS_FLAG_PREFIX` overrides the flag
    /// prefix.
    pub fn from_env() -> Self {
        let flag_prefix = std::env::var("PLEXUS_FLAG_PREFIX")
            .ok()
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or_else(|| DEFAULT_FLAG_PREFIX.to_string());

        Self {
            bus: BusConfig::from_env(),
            flag_prefix,
        }
    }

    /// Check that limits are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.max_trace_size == 0 {
            return Err(ConfigError::ZeroLimit("max_trace_size"));
        }
        if self.bus.max_emit_depth == 0 {
            return Err(ConfigError::ZeroLimit("max_emit_depth"));
        }
        if self.flag_prefix.is_empty() {
            return Err(ConfigError::EmptyFlagPrefix);
        }
        Ok(())
    }

    /// Validate configuration for production readiness.
    ///
    /// # Returns
    ///
    /// Returns `Err` if:
    /// - any limit is zero
    /// - event validation is permissive
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.bus.validation != ValidationMode::Strict {
            return Err(ConfigError::PermissiveValidation);
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A limit that must be positive is zero.
    ZeroLimit(&'static str),
    /// The feature flag prefix is empty.
    EmptyFlagPrefix,
    /// Unknown global events would only be logged.
    PermissiveValidation,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ZeroLimit(field) => write!(f, "Bus limit '{}' must be positive", field),
            ConfigError::EmptyFlagPrefix => write!(f, "Feature flag prefix must not be empty"),
            ConfigError::PermissiveValidation => {
                write!(
                    f,
                    "Permissive event validation is not allowed in production. \
                     Set PLEXUS_BUS_VALIDATION=strict."
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}
