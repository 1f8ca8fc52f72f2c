//! # Reactive State
//!
//! Named JSON-object containers shared between features. Each `set` that
//! actually changes a field notifies every change subscriber exactly once
//! and, when a bus is attached, publishes `state:changed`.
//!
//! Listeners run after the write lock is released, so a listener may read or
//! write the same state. Listener failures are logged and isolated.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use shared_bus::events::state;
use shared_bus::{EventPublisher, InMemoryEventBus};
use tracing::{debug, error, warn};

use crate::error::StateError;

/// One field change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    /// Name of the state container.
    pub state: String,
    /// Field that changed.
    pub field: String,
    /// Previous value (`null` if the field was absent).
    pub old_value: Value,
    /// New value.
    pub new_value: Value,
    /// All fields after the change.
    pub snapshot: Map<String, Value>,
}

type ChangeListener = Arc<dyn Fn(&StateChange) -> anyhow::Result<()> + Send + Sync>;

struct StateInner {
    name: String,
    fields: RwLock<Map<String, Value>>,
    listeners: RwLock<Vec<(u64, ChangeListener)>>,
    next_listener: AtomicU64,
    bus: Option<Arc<InMemoryEventBus>>,
}

/// Handle to a named state container. Clones share the same state.
#[derive(Clone)]
pub struct StateHandle {
    inner: Arc<StateInner>,
}

impl StateHandle {
    /// Container name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Current value of a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<Value> {
        self.inner.fields.read().get(field).cloned()
    }

    /// Copy of every field.
    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        self.inner.fields.read().clone()
    }

    /// Assign a field. Returns `true` if the value changed.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> bool {
        let new_value = value.into();
        let change = {
            let mut fields = self.inner.fields.write();
            let old_value = fields.get(field).cloned();
            if old_value.as_ref() == Some(&new_value) {
                return false;
            }
            fields.insert(field.to_string(), new_value.clone());
            StateChange {
                state: self.inner.name.clone(),
                field: field.to_string(),
                old_value: old_value.unwrap_or(Value::Null),
                new_value,
                snapshot: fields.clone(),
            }
        };

        debug!(state = %change.state, field = %change.field, "State changed");
        self.notify(&change);
        true
    }

    /// Register a change listener.
    pub fn subscribe<F>(&self, listener: F) -> StateSubscription
    where
        F: Fn(&StateChange) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().push((id, Arc::new(listener)));
        StateSubscription {
            id,
            state: Arc::downgrade(&self.inner),
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    fn notify(&self, change: &StateChange) {
        let listeners: Vec<ChangeListener> = self
            .inner
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(change))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(state = %change.state, field = %change.field, error = %format!("{e:#}"), "State listener failed");
                }
                Err(_) => {
                    error!(state = %change.state, field = %change.field, "State listener panicked");
                }
            }
        }

        if let Some(bus) = &self.inner.bus {
            match serde_json::to_value(change) {
                Ok(payload) => {
                    if let Err(e) = bus.emit(state::CHANGED, payload) {
                        warn!(state = %change.state, error = %e, "Failed to publish state change");
                    }
                }
                Err(e) => warn!(state = %change.state, error = %e, "Failed to serialize state change"),
            }
        }
    }
}

impl std::fmt::Debug for StateHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateHandle")
            .field("name", &self.inner.name)
            .field("fields", &self.snapshot())
            .finish()
    }
}

/// Handle returned by `StateHandle::subscribe`. Dropping it keeps the
/// listener registered.
#[must_use = "dropping a StateSubscription keeps the listener registered"]
pub struct StateSubscription {
    id: u64,
    state: Weak<StateInner>,
    active: Arc<AtomicBool>,
}

impl StateSubscription {
    /// Remove the listener. Returns `true` the first time.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(state) = self.state.upgrade() {
            state.listeners.write().retain(|(id, _)| *id != self.id);
        }
        true
    }

    /// Check if `unsubscribe` has not been called yet.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Registry of named state containers.
#[derive(Default)]
pub struct StateManager {
    states: RwLock<HashMap<String, StateHandle>>,
    bus: Option<Arc<InMemoryEventBus>>,
}

impl StateManager {
    /// Create a manager without bus publication.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager whose containers publish `state:changed`.
    #[must_use]
    pub fn with_bus(bus: Arc<InMemoryEventBus>) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            bus: Some(bus),
        }
    }

    /// Create a named container. `initial` must be a JSON object.
    pub fn create_state(&self, name: &str, initial: Value) -> Result<StateHandle, StateError> {
        let Value::Object(fields) = initial else {
            return Err(StateError::NotAnObject(name.to_string()));
        };

        let mut states = self.states.write();
        if states.contains_key(name) {
            return Err(StateError::AlreadyExists(name.to_string()));
        }
        let handle = StateHandle {
            inner: Arc::new(StateInner {
                name: name.to_string(),
                fields: RwLock::new(fields),
                listeners: RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                bus: self.bus.clone(),
            }),
        };
        states.insert(name.to_string(), handle.clone());
        debug!(state = %name, "State created");
        Ok(handle)
    }

    /// Look up a container.
    #[must_use]
    pub fn get_state(&self, name: &str) -> Option<StateHandle> {
        self.states.read().get(name).cloned()
    }

    /// Drop a container from the registry. Existing handles keep working.
    pub fn destroy_state(&self, name: &str) -> bool {
        self.states.write().remove(name).is_some()
    }

    /// Names of every container, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.states.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("states", &self.names())
            .finish()
    }
}
