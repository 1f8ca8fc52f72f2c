//! # Dependency Container
//!
//! Keyed service registry with singleton / transient lifetimes and nested
//! scopes.
//!
//! ```text
//!   root ── "bus", "state", "flags"
//!    └── feature:viewer ── "theme" (shadows nothing, visible only here)
//! ```
//!
//! A singleton is cached in the scope that registered it, so resolving it
//! through a child returns the parent's instance. A transient is rebuilt on
//! every `get`, against the scope it was requested from.

use std::any::{type_name, Any};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::ContainerError;

/// Name of the scope returned by `DependencyContainer::new`.
pub const ROOT_SCOPE: &str = "root";

type Service = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&DependencyContainer) -> anyhow::Result<Service> + Send + Sync>;

/// Caching policy for factory-built services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceScope {
    /// Built on first `get`, then shared.
    #[default]
    Singleton,
    /// Built on every `get`.
    Transient,
}

enum ServiceEntry {
    Instance(Service),
    Factory {
        scope: ServiceScope,
        factory: Factory,
        cached: Mutex<Option<Service>>,
    },
}

thread_local! {
    /// Services currently being constructed on this thread, as
    /// (owning scope address, key).
    static RESOLVING: RefCell<Vec<(usize, String)>> = const { RefCell::new(Vec::new()) };
}

/// Marks `key` in `owner` as under construction until dropped.
struct ResolveGuard;

impl ResolveGuard {
    fn enter(owner: &DependencyContainer, key: &str) -> Result<Self, ContainerError> {
        let id = owner as *const DependencyContainer as usize;
        RESOLVING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(start) = stack.iter().position(|(o, k)| *o == id && k == key) {
                let mut chain: Vec<String> = stack[start..].iter().map(|(_, k)| k.clone()).collect();
                chain.push(key.to_string());
                return Err(ContainerError::CircularDependency { chain });
            }
            stack.push((id, key.to_string()));
            Ok(Self)
        })
    }
}

impl Drop for ResolveGuard {
    fn drop(&mut self) {
        RESOLVING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Keyed service registry.
pub struct DependencyContainer {
    name: String,
    parent: Option<Arc<DependencyContainer>>,
    services: RwLock<HashMap<String, Arc<ServiceEntry>>>,
}

impl DependencyContainer {
    /// Create a root container.
    #[must_use]
    pub fn new() -> Self {
        Self::named(ROOT_SCOPE)
    }

    /// Create a root container with a custom scope name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Create a child scope that falls back to `self` for unknown keys.
    #[must_use]
    pub fn create_scope(self: &Arc<Self>, name: impl Into<String>) -> Arc<Self> {
        let child = Self {
            name: name.into(),
            parent: Some(Arc::clone(self)),
            services: RwLock::new(HashMap::new()),
        };
        debug!(scope = %child.name, parent = %self.name, "Child scope created");
        Arc::new(child)
    }

    /// Scope name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent scope, if any.
    #[must_use]
    pub fn parent(&self) -> Option<&Arc<DependencyContainer>> {
        self.parent.as_ref()
    }

    /// Register a ready-made value as a singleton.
    pub fn register_instance<T>(&self, key: impl Into<String>, value: T) -> Result<(), ContainerError>
    where
        T: Any + Send + Sync,
    {
        self.register_shared(key, Arc::new(value))
    }

    /// Register an already shared value; `get` hands out clones of this `Arc`.
    pub fn register_shared<T>(&self, key: impl Into<String>, value: Arc<T>) -> Result<(), ContainerError>
    where
        T: Any + Send + Sync,
    {
        self.insert(key.into(), ServiceEntry::Instance(value))
    }

    /// Register a factory with the given caching policy.
    ///
    /// The factory receives the scope to resolve its own dependencies from.
    pub fn register_factory<T, F>(
        &self,
        key: impl Into<String>,
        scope: ServiceScope,
        factory: F,
    ) -> Result<(), ContainerError>
    where
        T: Any + Send + Sync,
        F: Fn(&DependencyContainer) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |container: &DependencyContainer| {
            let service: Service = Arc::new(factory(container)?);
            Ok(service)
        });
        self.insert(
            key.into(),
            ServiceEntry::Factory {
                scope,
                factory,
                cached: Mutex::new(None),
            },
        )
    }

    /// Resolve `key` as a `T`, searching parent scopes.
    pub fn get<T>(&self, key: &str) -> Result<Arc<T>, ContainerError>
    where
        T: Any + Send + Sync,
    {
        self.resolve(key)?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Check if `key` resolves in this scope or a parent.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Keys registered directly in this scope, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.services.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn insert(&self, key: String, entry: ServiceEntry) -> Result<(), ContainerError> {
        let mut services = self.services.write();
        if services.contains_key(&key) {
            return Err(ContainerError::AlreadyRegistered {
                key,
                scope: self.name.clone(),
            });
        }
        debug!(scope = %self.name, key = %key, "Service registered");
        services.insert(key, Arc::new(entry));
        Ok(())
    }

    /// Find the entry for `key` and the scope that owns it.
    fn lookup(&self, key: &str) -> Option<(Arc<ServiceEntry>, &DependencyContainer)> {
        let mut scope = self;
        loop {
            if let Some(entry) = scope.services.read().get(key).cloned() {
                return Some((entry, scope));
            }
            scope = scope.parent.as_deref()?;
        }
    }

    fn resolve(&self, key: &str) -> Result<Service, ContainerError> {
        let Some((entry, owner)) = self.lookup(key) else {
            return Err(ContainerError::NotFound {
                key: key.to_string(),
                scope: self.name.clone(),
            });
        };

        match entry.as_ref() {
            ServiceEntry::Instance(service) => Ok(Arc::clone(service)),
            ServiceEntry::Factory {
                scope: ServiceScope::Transient,
                factory,
                ..
            } => build(key, factory, owner, self),
            ServiceEntry::Factory {
                scope: ServiceScope::Singleton,
                factory,
                cached,
            } => {
                if let Some(service) = cached.lock().clone() {
                    return Ok(service);
                }
                let built = build(key, factory, owner, owner)?;
                // Another thread may have won the race; the first instance stays.
                let mut slot = cached.lock();
                Ok(Arc::clone(slot.get_or_insert(built)))
            }
        }
    }
}

/// Run a factory registered in `owner` against `scope`, with cycle detection.
/// No container lock is held here.
fn build(
    key: &str,
    factory: &Factory,
    owner: &DependencyContainer,
    scope: &DependencyContainer,
) -> Result<Service, ContainerError> {
    let _guard = ResolveGuard::enter(owner, key)?;
    debug!(scope = %scope.name, key, "Constructing service");
    factory(scope).map_err(|e| match e.downcast::<ContainerError>() {
        Ok(cycle @ ContainerError::CircularDependency { .. }) => cycle,
        Ok(other) => ContainerError::FactoryFailed {
            key: key.to_string(),
            reason: other.to_string(),
        },
        Err(e) => ContainerError::FactoryFailed {
            key: key.to_string(),
            reason: format!("{e:#}"),
        },
    })
}

impl Default for DependencyContainer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DependencyContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyContainer")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .field("keys", &self.keys())
            .finish()
    }
}
