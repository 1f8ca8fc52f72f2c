//! # Feature Contract
//!
//! The trait every pluggable module implements and the context it is
//! installed with.

use std::sync::Arc;

use async_trait::async_trait;
use shared_bus::{InMemoryEventBus, ScopedEventBus};

use crate::container::DependencyContainer;
use crate::logger::FeatureLogger;

/// Everything a feature may touch while installed.
///
/// Features talk to each other only through the buses and the container.
#[derive(Debug, Clone)]
pub struct FeatureContext {
    /// Bus namespaced to `@<feature>/`. Disposed on uninstall.
    pub scoped_bus: Arc<ScopedEventBus>,
    /// The shared, unscoped bus.
    pub global_bus: Arc<InMemoryEventBus>,
    /// Logger stamped with the feature name.
    pub logger: FeatureLogger,
    /// Child scope `feature:<name>` of the application container. Local
    /// registrations are dropped with the context.
    pub container: Arc<DependencyContainer>,
}

impl FeatureContext {
    /// Build the context for `feature` under the application container.
    #[must_use]
    pub fn new(
        feature: &str,
        global_bus: Arc<InMemoryEventBus>,
        container: &Arc<DependencyContainer>,
    ) -> Self {
        Self {
            scoped_bus: Arc::new(ScopedEventBus::new(feature, Arc::clone(&global_bus))),
            global_bus,
            logger: FeatureLogger::new(feature),
            container: container.create_scope(format!("feature:{feature}")),
        }
    }
}

/// Trait that all features must implement for plug-and-play.
#[async_trait]
pub trait Feature: Send + Sync {
    /// Unique name. Also the scope of the feature's local events.
    fn name(&self) -> &str;

    /// Feature version, reported in lifecycle events.
    fn version(&self) -> &str {
        "0.1.0"
    }

    /// Names of features that must be installed first.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Flag that must be on for the feature to install.
    fn flag(&self) -> Option<&str> {
        None
    }

    /// Register handlers and services.
    async fn install(&self, ctx: &FeatureContext) -> anyhow::Result<()>;

    /// Release anything `install` set up outside the scoped bus.
    async fn uninstall(&self, _ctx: &FeatureContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when the feature starts receiving scoped events again.
    fn on_enable(&self, _ctx: &FeatureContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called before the feature's scoped handlers are silenced.
    fn on_disable(&self, _ctx: &FeatureContext) -> anyhow::Result<()> {
        Ok(())
    }
}
