//! # Application Runtime
//!
//! Builds the process-wide pieces once and wires them together:
//!
//! ```text
//!  RuntimeConfig ──► InMemoryEventBus ──┬──► StateManager   ("core.state")
//!                                       ├──► FeatureFlags   ("core.flags")
//!                                       └──► FeatureRegistry
//!                         DependencyContainer ("core.bus", "core.state", "core.flags")
//! ```
//!
//! Nothing here is global; embedders own the `AppRuntime` and pass it (or
//! its parts) where needed.

use std::sync::Arc;

use shared_bus::{EventCatalog, EventTable, InMemoryEventBus, MessageTracer};
use tracing::{error, info};

use crate::container::{DependencyContainer, RuntimeConfig};
use crate::error::{ContainerError, RegistryError};
use crate::flags::FeatureFlagManager;
use crate::registry::{Feature, FeatureRegistry, InstallReport};
use crate::state::StateManager;

/// Container key of the shared `InMemoryEventBus`.
pub const SERVICE_BUS: &str = "core.bus";
/// Container key of the `StateManager`.
pub const SERVICE_STATE: &str = "core.state";
/// Container key of the `FeatureFlagManager`.
pub const SERVICE_FLAGS: &str = "core.flags";

/// The assembled feature host.
pub struct AppRuntime {
    config: RuntimeConfig,
    bus: Arc<InMemoryEventBus>,
    container: Arc<DependencyContainer>,
    state: Arc<StateManager>,
    flags: Arc<FeatureFlagManager>,
    registry: FeatureRegistry,
}

impl AppRuntime {
    /// Build a runtime with the core event catalog.
    pub fn new(config: RuntimeConfig) -> Result<Self, ContainerError> {
        Self::with_catalog(config, EventCatalog::core())
    }

    /// Build a runtime with an application catalog.
    pub fn with_catalog(config: RuntimeConfig, catalog: EventCatalog) -> Result<Self, ContainerError> {
        let bus = Arc::new(InMemoryEventBus::with_catalog(config.bus.clone(), catalog));
        let state = Arc::new(StateManager::with_bus(Arc::clone(&bus)));
        let flags = Arc::new(FeatureFlagManager::with_bus(Arc::clone(&bus)));
        let loaded = flags.load_env(&config.flag_prefix);

        let container = Arc::new(DependencyContainer::new());
        container.register_shared(SERVICE_BUS, Arc::clone(&bus))?;
        container.register_shared(SERVICE_STATE, Arc::clone(&state))?;
        container.register_shared(SERVICE_FLAGS, Arc::clone(&flags))?;

        let registry = FeatureRegistry::new(
            Arc::clone(&bus),
            Arc::clone(&container),
            Arc::clone(&flags),
        );

        info!(
            validation = ?config.bus.validation,
            tracing = config.bus.tracing_enabled,
            flags = loaded,
            "Runtime assembled"
        );

        Ok(Self {
            config,
            bus,
            container,
            state,
            flags,
            registry,
        })
    }

    /// Add an application event table to the bus catalog.
    pub fn register_events(&self, table: &EventTable) {
        self.bus.register_events(table);
    }

    /// Register a feature.
    pub fn register(&self, feature: Arc<dyn Feature>) -> Result<(), RegistryError> {
        self.registry.register(feature)
    }

    /// Install every registered feature, then enable what was installed.
    ///
    /// Enable failures are logged; the first one is returned.
    pub async fn start(&self) -> Result<InstallReport, RegistryError> {
        let report = self.registry.install_all().await?;
        if let Err(errors) = self.registry.enable_all() {
            for e in &errors {
                error!("[Runtime] {}", e);
            }
            if let Some(first) = errors.into_iter().next() {
                return Err(first);
            }
        }
        Ok(report)
    }

    /// Uninstall everything in reverse install order.
    pub async fn shutdown(&self) -> Result<(), Vec<RegistryError>> {
        info!("[Runtime] Shutting down");
        self.registry.uninstall_all().await
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn bus(&self) -> Arc<InMemoryEventBus> {
        Arc::clone(&self.bus)
    }

    /// Message tracer, when tracing is enabled.
    #[must_use]
    pub fn tracer(&self) -> Option<Arc<MessageTracer>> {
        self.bus.tracer()
    }

    #[must_use]
    pub fn container(&self) -> Arc<DependencyContainer> {
        Arc::clone(&self.container)
    }

    #[must_use]
    pub fn state(&self) -> Arc<StateManager> {
        Arc::clone(&self.state)
    }

    #[must_use]
    pub fn flags(&self) -> Arc<FeatureFlagManager> {
        Arc::clone(&self.flags)
    }

    #[must_use]
    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }
}
