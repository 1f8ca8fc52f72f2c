//! # Feature Runtime Library
//!
//! Hosts pluggable features on top of `shared-bus`. The main entry point for
//! embedders is `AppRuntime`; the `main.rs` binary is a minimal host.
//!
//! ## Architectural Patterns
//!
//! - **EDA (Event-Driven Architecture)**: Features communicate via Event Bus only
//! - **Dependency Injection**: Services are resolved from a scoped container
//! - **Plug-and-Play**: Features install in dependency order and can be gated
//!   by feature flags

#![allow(clippy::type_complexity)]
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod container;
pub mod error;
pub mod flags;
pub mod logger;
pub mod registry;
pub mod runtime;
pub mod state;

// Re-export main types for easy access
pub use container::{ConfigError, DependencyContainer, RuntimeConfig, ServiceScope};
pub use error::{ContainerError, DependencyError, RegistryError, StateError};
pub use flags::FeatureFlagManager;
pub use logger::FeatureLogger;
pub use registry::{Feature, FeatureContext, FeatureRegistry, FeatureStatus, InstallReport};
pub use runtime::{AppRuntime, SERVICE_BUS, SERVICE_FLAGS, SERVICE_STATE};
pub use state::{StateChange, StateHandle, StateManager, StateSubscription};
