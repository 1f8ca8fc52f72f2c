//! # Runtime Errors
//!
//! Typed failures for the container, the feature registry and the state
//! manager. Feature hooks return `anyhow::Result`; their messages are folded
//! into these enums at the registry boundary.

use thiserror::Error;

use crate::registry::FeatureStatus;

/// Errors from resolving or registering container services.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// No service under `key` in this scope or any parent.
    #[error("Service '{key}' not found in scope '{scope}'")]
    NotFound { key: String, scope: String },

    /// A service is already registered under `key` in this scope.
    #[error("Service '{key}' already registered in scope '{scope}'")]
    AlreadyRegistered { key: String, scope: String },

    /// The stored service is not of the requested type.
    #[error("Service '{key}' is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// A factory resolved (directly or transitively) its own key.
    #[error("Circular service dependency: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    /// A factory returned an error.
    #[error("Factory for '{key}' failed: {reason}")]
    FactoryFailed { key: String, reason: String },
}

/// Errors in the dependency graph between features.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DependencyError {
    /// A feature depends on a name nobody registered.
    #[error("Feature '{feature}' depends on unregistered feature '{dependency}'")]
    MissingDependency { feature: String, dependency: String },

    /// Dependencies form a cycle. The first name is repeated at the end.
    #[error("Cyclic feature dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
}

/// Errors from feature registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A feature with this name is already registered.
    #[error("Feature '{0}' is already registered")]
    AlreadyRegistered(String),

    /// No feature with this name is registered.
    #[error("Feature '{0}' is not registered")]
    NotFound(String),

    /// The feature name cannot be used as a bus scope.
    #[error("Invalid feature name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// The dependency graph is broken.
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// The requested state transition is not allowed.
    #[error("Feature '{feature}' cannot go from {current} to {requested}")]
    Lifecycle {
        feature: String,
        current: FeatureStatus,
        requested: FeatureStatus,
    },

    /// Only registered or uninstalled features can be unregistered.
    #[error("Feature '{feature}' is {current}; uninstall it before unregistering")]
    StillInstalled {
        feature: String,
        current: FeatureStatus,
    },

    /// `install_all` stopped at the first failing feature.
    #[error("Install of '{failed}' failed: {reason} (installed: {installed:?}, not attempted: {pending:?})")]
    InstallAborted {
        failed: String,
        installed: Vec<String>,
        pending: Vec<String>,
        reason: String,
    },

    /// A feature's `uninstall` hook failed.
    #[error("Uninstall of '{feature}' failed: {reason}")]
    UninstallFailed { feature: String, reason: String },

    /// Left installed because an installed dependent could not be uninstalled.
    #[error("Feature '{feature}' kept installed: dependent '{dependent}' is still installed")]
    UninstallBlocked { feature: String, dependent: String },

    /// An `on_enable` / `on_disable` hook failed.
    #[error("Hook '{hook}' of '{feature}' failed: {reason}")]
    HookFailed {
        feature: String,
        hook: &'static str,
        reason: String,
    },
}

/// Errors from the state manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// A state container with this name already exists.
    #[error("State '{0}' already exists")]
    AlreadyExists(String),

    /// The initial value of a state container must be a JSON object.
    #[error("Initial value of state '{0}' is not an object")]
    NotAnObject(String),
}
