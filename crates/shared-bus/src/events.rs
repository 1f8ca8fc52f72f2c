//! # Event Catalog
//!
//! Defines the event-constant tables and the whitelist assembled from them.
//!
//! Global event names must appear in the catalog. Scoped names
//! (`@<scope>/<name>`) are owned by a single feature and bypass the catalog.
//! The catalog is built by walking nested `EventTable`s recursively, so an
//! application contributes its own tables next to `CORE_EVENTS`.

use std::collections::BTreeSet;

use crate::error::BusError;

/// Prefix marking a scoped (feature-local) event name.
pub const SCOPE_MARKER: char = '@';

/// Events published by the feature registry.
pub mod feature {
    /// A feature finished `install`.
    pub const INSTALLED: &str = "feature:installed";
    /// A feature was enabled.
    pub const ENABLED: &str = "feature:enabled";
    /// A feature was disabled.
    pub const DISABLED: &str = "feature:disabled";
    /// A feature finished `uninstall`.
    pub const UNINSTALLED: &str = "feature:uninstalled";
}

/// Events published by the state manager.
pub mod state {
    /// A field of a named state container changed.
    pub const CHANGED: &str = "state:changed";
}

/// Events published by the feature flag manager.
pub mod flag {
    /// A feature flag was switched.
    pub const CHANGED: &str = "flag:changed";
}

/// A named table of event constants with optional nested tables.
#[derive(Debug, Clone, Copy)]
pub struct EventTable {
    /// Table name, for diagnostics.
    pub name: &'static str,
    /// Event names declared directly in this table.
    pub events: &'static [&'static str],
    /// Nested tables.
    pub tables: &'static [EventTable],
}

impl EventTable {
    /// Visit every event name in this table and its nested tables.
    pub fn for_each_event(&self, f: &mut dyn FnMut(&'static str)) {
        for event in self.events {
            f(event);
        }
        for table in self.tables {
            table.for_each_event(f);
        }
    }
}

const FEATURE_EVENTS: EventTable = EventTable {
    name: "feature",
    events: &[
        feature::INSTALLED,
        feature::ENABLED,
        feature::DISABLED,
        feature::UNINSTALLED,
    ],
    tables: &[],
};

const STATE_EVENTS: EventTable = EventTable {
    name: "state",
    events: &[state::CHANGED, flag::CHANGED],
    tables: &[],
};

/// Events emitted by the substrate itself.
pub const CORE_EVENTS: EventTable = EventTable {
    name: "core",
    events: &[],
    tables: &[FEATURE_EVENTS, STATE_EVENTS],
};

/// Whitelist of global event names.
#[derive(Debug, Clone, Default)]
pub struct EventCatalog {
    names: BTreeSet<String>,
}

impl EventCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a catalog holding the core substrate events.
    #[must_use]
    pub fn core() -> Self {
        Self::empty().with_table(&CORE_EVENTS)
    }

    /// Create a catalog from several root tables.
    #[must_use]
    pub fn from_tables(tables: &[&EventTable]) -> Self {
        tables
            .iter()
            .fold(Self::empty(), |catalog, table| catalog.with_table(table))
    }

    /// Add every event of `table`, recursively.
    #[must_use]
    pub fn with_table(mut self, table: &EventTable) -> Self {
        table.for_each_event(&mut |event| {
            self.names.insert(event.to_string());
        });
        self
    }

    /// Add a single event name.
    pub fn insert(&mut self, event: impl Into<String>) {
        self.names.insert(event.into());
    }

    /// Check if a global event name is whitelisted.
    #[must_use]
    pub fn contains(&self, event: &str) -> bool {
        self.names.contains(event)
    }

    /// Check if an event is acceptable: scoped, or whitelisted.
    #[must_use]
    pub fn allows(&self, event: &str) -> bool {
        is_scoped(event) || self.contains(event)
    }

    /// Number of whitelisted names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterate over the whitelisted names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Check if an event name is already scoped.
#[must_use]
pub fn is_scoped(event: &str) -> bool {
    event.starts_with(SCOPE_MARKER) && event.len() > 1
}

/// Render a local event name under a scope, without double-prefixing.
#[must_use]
pub fn scoped_name(scope: &str, local: &str) -> String {
    if is_scoped(local) {
        local.to_string()
    } else {
        format!("{}{}/{}", SCOPE_MARKER, scope, local)
    }
}

/// Check the shape of an event name (not its catalog membership).
pub fn check_event_name(event: &str) -> Result<(), BusError> {
    if event.is_empty() {
        return Err(BusError::InvalidEventName {
            event: event.to_string(),
            reason: "empty name".to_string(),
        });
    }
    if event.chars().any(char::is_whitespace) {
        return Err(BusError::InvalidEventName {
            event: event.to_string(),
            reason: "whitespace not allowed".to_string(),
        });
    }
    if event == "@" {
        return Err(BusError::InvalidEventName {
            event: event.to_string(),
            reason: "missing scope".to_string(),
        });
    }
    Ok(())
}
