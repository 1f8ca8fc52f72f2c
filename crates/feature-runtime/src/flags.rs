//! # Feature Flags
//!
//! Boolean switches that gate optional features. Unset flags read as `false`.
//! Environment keys map to flag names by stripping the prefix, lowercasing
//! and turning `_` into `-`: `PLEXUS_FLAG_SEARCH_PANEL=1` enables
//! `search-panel`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::json;
use shared_bus::events::flag;
use shared_bus::{EventPublisher, InMemoryEventBus};
use tracing::{info, warn};

/// Registry of named boolean flags.
#[derive(Default)]
pub struct FeatureFlagManager {
    flags: RwLock<HashMap<String, bool>>,
    bus: Option<Arc<InMemoryEventBus>>,
}

impl FeatureFlagManager {
    /// Create an empty flag set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty flag set that publishes `flag:changed`.
    #[must_use]
    pub fn with_bus(bus: Arc<InMemoryEventBus>) -> Self {
        Self {
            flags: RwLock::new(HashMap::new()),
            bus: Some(bus),
        }
    }

    /// Load every `<prefix><NAME>` variable from the process environment.
    ///
    /// Returns the number of flags loaded.
    pub fn load_env(&self, prefix: &str) -> usize {
        self.load_vars(prefix, std::env::vars())
    }

    /// Create a flag set from the process environment.
    #[must_use]
    pub fn from_env(prefix: &str) -> Self {
        let flags = Self::new();
        flags.load_env(prefix);
        flags
    }

    fn load_vars(&self, prefix: &str, vars: impl IntoIterator<Item = (String, String)>) -> usize {
        let mut loaded = 0;
        for (key, value) in vars {
            let Some(raw_name) = key.strip_prefix(prefix) else {
                continue;
            };
            if raw_name.is_empty() {
                continue;
            }
            let Some(enabled) = parse_bool(&value) else {
                warn!(key = %key, value = %value, "Ignoring feature flag with non-boolean value");
                continue;
            };
            self.set(&env_flag_name(raw_name), enabled);
            loaded += 1;
        }
        loaded
    }

    /// Turn a flag on.
    pub fn enable(&self, name: &str) -> bool {
        self.set(name, true)
    }

    /// Turn a flag off.
    pub fn disable(&self, name: &str) -> bool {
        self.set(name, false)
    }

    /// Set a flag. Returns `true` if the value changed.
    pub fn set(&self, name: &str, enabled: bool) -> bool {
        let previous = self.flags.write().insert(name.to_string(), enabled);
        if previous == Some(enabled) {
            return false;
        }

        info!(flag = %name, enabled, "Feature flag set");
        if let Some(bus) = &self.bus {
            let payload = json!({ "flag": name, "enabled": enabled });
            if let Err(e) = bus.emit(flag::CHANGED, payload) {
                warn!(flag = %name, error = %e, "Failed to publish flag change");
            }
        }
        true
    }

    /// Check a flag. Unknown flags are off.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags.read().get(name).copied().unwrap_or(false)
    }

    /// Every flag that has been set, sorted by name.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.flags
            .read()
            .iter()
            .map(|(name, enabled)| (name.clone(), *enabled))
            .collect()
    }
}

impl std::fmt::Debug for FeatureFlagManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureFlagManager")
            .field("flags", &self.snapshot())
            .finish()
    }
}

fn env_flag_name(raw: &str) -> String {
    raw.to_lowercase().replace('_', "-")
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
