//! # Feature Registry - Dependency-Ordered Plug-and-Play
//!
//! Features register here and are installed in dependency order. Each one
//! receives a `FeatureContext` and talks to the rest of the application
//! ONLY through the event bus and the service container.
//!
//! ## Lifecycle
//!
//! ```text
//!  register ──► Registered ──install_all──► Installed ──enable──► Enabled
//!                                               │                 ▲   │
//!                                               │           enable│   │disable
//!                                               │                 │   ▼
//!                                               └──uninstall──┐  Disabled
//!                                                             ▼     │
//!                                                        Uninstalled◄┘
//! ```
//!
//! ## Rules
//!
//! 1. **Registration**: duplicate names and dependency cycles are rejected
//!    immediately; unknown dependencies are reported at install time
//! 2. **Install**: topological order, ties by registration order, fail-fast
//! 3. **Flags**: a feature whose flag is off stays `Registered`, and so do
//!    its dependents
//! 4. **Uninstall**: installed dependents go first; scoped subscriptions are
//!    disposed
//!
//! Lifecycle hooks run without any registry lock held. `install_all`,
//! `uninstall` and `uninstall_all` are serialized against each other.

pub mod feature;
mod order;

pub use feature::{Feature, FeatureContext};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::json;
use shared_bus::events::feature as lifecycle;
use shared_bus::{EventPublisher, InMemoryEventBus, MessageMeta};
use tracing::{error, info, warn, Instrument};

use crate::container::DependencyContainer;
use crate::error::{DependencyError, RegistryError};
use crate::flags::FeatureFlagManager;
use order::Node;

/// Actor id stamped on lifecycle events.
pub const REGISTRY_ACTOR: &str = "registry";

/// Feature status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureStatus {
    /// Registered but not installed.
    Registered,
    /// `install` completed.
    Installed,
    /// Receiving scoped events after `enable`.
    Enabled,
    /// Scoped handlers silenced by `disable`.
    Disabled,
    /// `uninstall` completed. Terminal.
    Uninstalled,
}

impl FeatureStatus {
    /// Lowercase name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Installed => "installed",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Uninstalled => "uninstalled",
        }
    }

    /// Check if the feature currently holds an install context.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        matches!(self, Self::Installed | Self::Enabled | Self::Disabled)
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a successful `install_all`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    /// Features installed by this call, in install order.
    pub installed: Vec<String>,
    /// Features left `Registered` because a flag (theirs or a dependency's) is off.
    pub skipped: Vec<String>,
}

struct FeatureEntry {
    feature: Arc<dyn Feature>,
    version: String,
    dependencies: Vec<String>,
    flag: Option<String>,
    status: FeatureStatus,
    context: Option<FeatureContext>,
}

#[derive(Default)]
struct Features {
    entries: HashMap<String, FeatureEntry>,
    /// Names in registration order.
    registration: Vec<String>,
    /// Currently installed names, in install order.
    installed: Vec<String>,
}

impl Features {
    fn nodes(&self) -> Vec<Node> {
        self.registration
            .iter()
            .filter_map(|name| {
                self.entries
                    .get(name)
                    .map(|entry| (name.clone(), entry.dependencies.clone()))
            })
            .collect()
    }

    fn status(&self, name: &str) -> Option<FeatureStatus> {
        self.entries.get(name).map(|entry| entry.status)
    }

    /// `root` and every installed feature depending on it, dependents first.
    fn teardown_plan(&self, root: &str) -> Vec<String> {
        let mut doomed: HashSet<&str> = HashSet::from([root]);
        for name in &self.installed {
            let depends_on_doomed = self.entries.get(name).is_some_and(|entry| {
                entry
                    .dependencies
                    .iter()
                    .any(|dep| doomed.contains(dep.as_str()))
            });
            if depends_on_doomed {
                doomed.insert(name.as_str());
            }
        }
        self.installed
            .iter()
            .rev()
            .filter(|name| doomed.contains(name.as_str()))
            .cloned()
            .collect()
    }
}

/// The central feature registry.
pub struct FeatureRegistry {
    features: RwLock<Features>,
    /// Serializes install and uninstall passes.
    lifecycle: tokio::sync::Mutex<()>,
    /// Shared event bus - the ONLY way features communicate.
    event_bus: Arc<InMemoryEventBus>,
    container: Arc<DependencyContainer>,
    flags: Arc<FeatureFlagManager>,
}

impl FeatureRegistry {
    /// Create an empty registry.
    pub fn new(
        event_bus: Arc<InMemoryEventBus>,
        container: Arc<DependencyContainer>,
        flags: Arc<FeatureFlagManager>,
    ) -> Self {
        Self {
            features: RwLock::new(Features::default()),
            lifecycle: tokio::sync::Mutex::new(()),
            event_bus,
            container,
            flags,
        }
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> Arc<InMemoryEventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Get the service container features are installed with.
    pub fn container(&self) -> Arc<DependencyContainer> {
        Arc::clone(&self.container)
    }

    /// Get the flags gating optional features.
    pub fn flags(&self) -> Arc<FeatureFlagManager> {
        Arc::clone(&self.flags)
    }

    /// Register a feature.
    pub fn register(&self, feature: Arc<dyn Feature>) -> Result<(), RegistryError> {
        let name = feature.name().to_string();
        check_feature_name(&name)?;
        let dependencies = feature.dependencies();

        let mut features = self.features.write();
        if features.entries.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }

        // The existing graph is acyclic, so any cycle runs through the newcomer.
        let mut nodes: Vec<Node> = vec![(name.clone(), dependencies.clone())];
        nodes.extend(features.nodes());
        if let Some(cycle) = order::find_cycle(&nodes) {
            warn!("[Registry] Rejecting {}: dependency cycle {}", name, cycle.join(" -> "));
            return Err(DependencyError::CyclicDependency { cycle }.into());
        }

        let version = feature.version().to_string();
        info!("[Registry] Registering feature: {} v{}", name, version);
        features.registration.push(name.clone());
        features.entries.insert(
            name,
            FeatureEntry {
                flag: feature.flag().map(str::to_string),
                feature,
                version,
                dependencies,
                status: FeatureStatus::Registered,
                context: None,
            },
        );
        Ok(())
    }

    /// Remove a feature that is not installed.
    pub fn unregister(&self, name: &str) -> Result<(), RegistryError> {
        let mut features = self.features.write();
        let status = features
            .status(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        if status.is_installed() {
            return Err(RegistryError::StillInstalled {
                feature: name.to_string(),
                current: status,
            });
        }
        features.entries.remove(name);
        features.registration.retain(|n| n != name);
        info!("[Registry] Unregistered feature: {}", name);
        Ok(())
    }

    /// Install every `Registered` feature in dependency order.
    ///
    /// Stops at the first failing install; features after it are left
    /// `Registered` and listed in `RegistryError::InstallAborted::pending`.
    pub async fn install_all(&self) -> Result<InstallReport, RegistryError> {
        let _lifecycle = self.lifecycle.lock().await;
        let order = order::topological_order(&self.features.read().nodes())?;
        let mut report = InstallReport::default();

        for (position, name) in order.iter().enumerate() {
            let (feature, dependencies, flag) = {
                let features = self.features.read();
                let Some(entry) = features.entries.get(name) else {
                    continue;
                };
                if entry.status != FeatureStatus::Registered {
                    continue;
                }
                (
                    Arc::clone(&entry.feature),
                    entry.dependencies.clone(),
                    entry.flag.clone(),
                )
            };

            if let Some(flag) = flag.filter(|flag| !self.flags.is_enabled(flag)) {
                info!("[Registry] Skipping {}: flag '{}' is off", name, flag);
                report.skipped.push(name.clone());
                continue;
            }
            let blocked = dependencies
                .iter()
                .find(|dep| !self.status(dep).is_some_and(|s| s.is_installed()));
            if let Some(dep) = blocked {
                info!("[Registry] Skipping {}: dependency {} is not installed", name, dep);
                report.skipped.push(name.clone());
                continue;
            }

            info!("[Registry] Installing {}", name);
            let ctx = FeatureContext::new(
                name,
                Arc::clone(&self.event_bus),
                &self.container,
            );
            let span = ctx.logger.span("install");
            if let Err(e) = feature.install(&ctx).instrument(span).await {
                ctx.scoped_bus.dispose();
                let reason = format!("{e:#}");
                error!("[Registry] Install of {} failed: {}", name, reason);
                let features = self.features.read();
                let pending = order[position + 1..]
                    .iter()
                    .filter(|n| features.status(n) == Some(FeatureStatus::Registered))
                    .cloned()
                    .collect();
                return Err(RegistryError::InstallAborted {
                    failed: name.clone(),
                    installed: report.installed,
                    pending,
                    reason,
                });
            }

            let version = {
                let mut features = self.features.write();
                match features.entries.get_mut(name) {
                    Some(entry) => {
                        entry.status = FeatureStatus::Installed;
                        entry.context = Some(ctx);
                        let version = entry.version.clone();
                        features.installed.push(name.clone());
                        Some(version)
                    }
                    None => None,
                }
            };
            let Some(version) = version else {
                warn!("[Registry] {} was unregistered during install", name);
                continue;
            };

            self.publish(lifecycle::INSTALLED, name, &version);
            report.installed.push(name.clone());
        }

        info!(
            "[Registry] Install pass complete: {} installed, {} skipped",
            report.installed.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Enable an installed or disabled feature.
    pub fn enable(&self, name: &str) -> Result<(), RegistryError> {
        let allowed = [FeatureStatus::Installed, FeatureStatus::Disabled];
        let (feature, ctx) = self.begin_transition(name, &allowed, FeatureStatus::Enabled)?;

        feature
            .on_enable(&ctx)
            .map_err(|e| RegistryError::HookFailed {
                feature: name.to_string(),
                hook: "on_enable",
                reason: format!("{e:#}"),
            })?;
        ctx.scoped_bus.set_active(true);

        let version = self.finish_transition(name, &allowed, FeatureStatus::Enabled)?;
        info!("[Registry] Enabled {}", name);
        self.publish(lifecycle::ENABLED, name, &version);
        Ok(())
    }

    /// Disable an enabled feature; its scoped handlers stop receiving events.
    pub fn disable(&self, name: &str) -> Result<(), RegistryError> {
        let allowed = [FeatureStatus::Enabled];
        let (feature, ctx) = self.begin_transition(name, &allowed, FeatureStatus::Disabled)?;

        feature
            .on_disable(&ctx)
            .map_err(|e| RegistryError::HookFailed {
                feature: name.to_string(),
                hook: "on_disable",
                reason: format!("{e:#}"),
            })?;
        ctx.scoped_bus.set_active(false);

        let version = self.finish_transition(name, &allowed, FeatureStatus::Disabled)?;
        info!("[Registry] Disabled {}", name);
        self.publish(lifecycle::DISABLED, name, &version);
        Ok(())
    }

    /// Enable every `Installed` feature, in install order.
    pub fn enable_all(&self) -> Result<(), Vec<RegistryError>> {
        let ready: Vec<String> = {
            let features = self.features.read();
            features
                .installed
                .iter()
                .filter(|name| features.status(name) == Some(FeatureStatus::Installed))
                .cloned()
                .collect()
        };

        let errors: Vec<RegistryError> = ready
            .iter()
            .filter_map(|name| self.enable(name).err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Uninstall a feature and, first, every installed feature depending on it.
    ///
    /// Returns the uninstalled names in teardown order.
    pub async fn uninstall(&self, name: &str) -> Result<Vec<String>, RegistryError> {
        let _lifecycle = self.lifecycle.lock().await;
        let plan = {
            let features = self.features.read();
            let status = features
                .status(name)
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
            if !status.is_installed() {
                return Err(RegistryError::Lifecycle {
                    feature: name.to_string(),
                    current: status,
                    requested: FeatureStatus::Uninstalled,
                });
            }
            features.teardown_plan(name)
        };

        let mut removed = Vec::with_capacity(plan.len());
        for target in plan {
            self.uninstall_one(&target).await?;
            removed.push(target);
        }
        Ok(removed)
    }

    /// Uninstall everything in reverse install order.
    ///
    /// A failing `uninstall` hook is reported but does not stop the pass.
    /// The failed feature's dependencies, direct or transitive, stay
    /// installed and are reported as `UninstallBlocked`.
    pub async fn uninstall_all(&self) -> Result<(), Vec<RegistryError>> {
        let _lifecycle = self.lifecycle.lock().await;
        let order: Vec<String> = self.features.read().installed.iter().rev().cloned().collect();

        // Dependencies of a feature that stays installed stay installed too.
        let mut held: HashMap<String, String> = HashMap::new();
        let mut errors = Vec::new();
        for name in order {
            if let Some(dependent) = held.get(&name).cloned() {
                warn!("[Registry] Keeping {}: dependent {} is still installed", name, dependent);
                self.hold_dependencies(&name, &mut held);
                errors.push(RegistryError::UninstallBlocked {
                    feature: name,
                    dependent,
                });
                continue;
            }
            if let Err(e) = self.uninstall_one(&name).await {
                self.hold_dependencies(&name, &mut held);
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Mark every direct dependency of `name` as held by it.
    fn hold_dependencies(&self, name: &str, held: &mut HashMap<String, String>) {
        let features = self.features.read();
        if let Some(entry) = features.entries.get(name) {
            for dep in &entry.dependencies {
                held.entry(dep.clone()).or_insert_with(|| name.to_string());
            }
        }
    }

    async fn uninstall_one(&self, name: &str) -> Result<(), RegistryError> {
        let (feature, ctx) = {
            let features = self.features.read();
            let Some(entry) = features.entries.get(name) else {
                return Ok(());
            };
            let Some(ctx) = entry.context.clone() else {
                return Ok(());
            };
            (Arc::clone(&entry.feature), ctx)
        };

        info!("[Registry] Uninstalling {}", name);
        let span = ctx.logger.span("uninstall");
        if let Err(e) = feature.uninstall(&ctx).instrument(span).await {
            let reason = format!("{e:#}");
            error!("[Registry] Uninstall of {} failed: {}", name, reason);
            return Err(RegistryError::UninstallFailed {
                feature: name.to_string(),
                reason,
            });
        }

        let disposed = ctx.scoped_bus.dispose();
        let version = {
            let mut features = self.features.write();
            features.installed.retain(|n| n != name);
            features.entries.get_mut(name).map(|entry| {
                entry.status = FeatureStatus::Uninstalled;
                entry.context = None;
                entry.version.clone()
            })
        };
        info!("[Registry] Uninstalled {} ({} subscriptions disposed)", name, disposed);
        if let Some(version) = version {
            self.publish(lifecycle::UNINSTALLED, name, &version);
        }
        Ok(())
    }

    /// Check `allowed` and hand out what the hook needs.
    fn begin_transition(
        &self,
        name: &str,
        allowed: &[FeatureStatus],
        requested: FeatureStatus,
    ) -> Result<(Arc<dyn Feature>, FeatureContext), RegistryError> {
        let features = self.features.read();
        let entry = features
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        let lifecycle_error = || RegistryError::Lifecycle {
            feature: name.to_string(),
            current: entry.status,
            requested,
        };
        if !allowed.contains(&entry.status) {
            return Err(lifecycle_error());
        }
        let ctx = entry.context.clone().ok_or_else(lifecycle_error)?;
        Ok((Arc::clone(&entry.feature), ctx))
    }

    /// Commit a transition if nothing moved the feature meanwhile.
    fn finish_transition(
        &self,
        name: &str,
        allowed: &[FeatureStatus],
        requested: FeatureStatus,
    ) -> Result<String, RegistryError> {
        let mut features = self.features.write();
        let entry = features
            .entries
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        if !allowed.contains(&entry.status) {
            return Err(RegistryError::Lifecycle {
                feature: name.to_string(),
                current: entry.status,
                requested,
            });
        }
        entry.status = requested;
        Ok(entry.version.clone())
    }

    fn publish(&self, event: &str, name: &str, version: &str) {
        let payload = json!({ "feature": name, "version": version });
        if let Err(e) = self
            .event_bus
            .emit_with_meta(event, payload, MessageMeta::actor(REGISTRY_ACTOR))
        {
            warn!("[Registry] Failed to publish {} for {}: {}", event, name, e);
        }
    }

    /// Get status of a feature.
    pub fn status(&self, name: &str) -> Option<FeatureStatus> {
        self.features.read().status(name)
    }

    /// Get all statuses, in registration order.
    pub fn statuses(&self) -> Vec<(String, FeatureStatus)> {
        let features = self.features.read();
        features
            .registration
            .iter()
            .filter_map(|name| features.status(name).map(|s| (name.clone(), s)))
            .collect()
    }

    /// Currently installed features, in install order.
    pub fn install_order(&self) -> Vec<String> {
        self.features.read().installed.clone()
    }

    /// Context of an installed feature.
    pub fn context(&self, name: &str) -> Option<FeatureContext> {
        self.features
            .read()
            .entries
            .get(name)
            .and_then(|entry| entry.context.clone())
    }

    /// Number of registered features.
    pub fn len(&self) -> usize {
        self.features.read().entries.len()
    }

    /// Check if no feature is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Print registry status.
    pub fn print_status(&self) {
        info!("===========================================");
        info!("  FEATURE REGISTRY STATUS");
        info!("===========================================");

        let features = self.features.read();
        for name in &features.registration {
            let Some(entry) = features.entries.get(name) else {
                continue;
            };
            let icon = match entry.status {
                FeatureStatus::Enabled => "✅",
                FeatureStatus::Disabled => "⏸️ ",
                FeatureStatus::Uninstalled => "⏹️ ",
                FeatureStatus::Installed => "📦",
                FeatureStatus::Registered => "⏳",
            };
            let flag = entry
                .flag
                .as_deref()
                .map(|flag| format!(" [flag: {}]", flag))
                .unwrap_or_default();
            info!("  {} {:24} v{:10} {}{}", icon, name, entry.version, entry.status, flag);
        }

        info!("===========================================");
    }
}

fn check_feature_name(name: &str) -> Result<(), RegistryError> {
    let reason = if name.is_empty() {
        "empty name"
    } else if name.chars().any(char::is_whitespace) {
        "whitespace not allowed"
    } else if name.contains('/') || name.contains('@') {
        "'/' and '@' are reserved for event scopes"
    } else {
        return Ok(());
    };
    Err(RegistryError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    })
}
