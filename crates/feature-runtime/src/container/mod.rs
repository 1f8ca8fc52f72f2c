//! # Service Container
//!
//! Runtime configuration plus the keyed service registry features resolve
//! their collaborators from.
//!
//! ## Resolution Rules
//!
//! - Singletons are built once per owning scope, transients on every `get`
//! - Child scopes fall back to their parent and may shadow parent keys
//! - No container lock is held while a factory runs

pub mod config;
pub mod services;

pub use config::{ConfigError, RuntimeConfig};
pub use services::{DependencyContainer, ServiceScope};
