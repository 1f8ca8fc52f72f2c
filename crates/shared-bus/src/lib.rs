//! # Shared Bus - In-Process Event Bus for Feature Modules
//!
//! Every feature module talks to the rest of the application through named
//! events published here. Direct calls between features are not part of the
//! contract.
//!
//! ## Publish / Subscribe
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │  Feature A   │                    │  Feature B   │
//! │ (scoped bus) │    emit()          │ (scoped bus) │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │ ─────────┘
//!                  │  + Tracer    │   on() handlers, in order
//!                  └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Snapshot dispatch:** handlers added or removed during an emit only see
//!   later emits
//! - **Fault isolation:** a failing or panicking handler is recorded, never
//!   propagated
//! - **Namespacing:** local events render as `@<scope>/<name>`; global names
//!   must be in the `EventCatalog`
//! - **Cascade tracing:** `TraceMeta::child()` links follow-up emits into one
//!   trace tree

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod config;
pub mod error;
pub mod events;
pub mod publisher;
pub mod scoped;
pub mod subscriber;
pub mod tracer;

// Re-export main types
pub use config::{BusConfig, ValidationMode};
pub use error::BusError;
pub use events::{is_scoped, scoped_name, EventCatalog, EventTable, CORE_EVENTS};
pub use publisher::{EmitReceipt, EventPublisher, InMemoryEventBus, MessageMeta, TraceMeta};
pub use scoped::ScopedEventBus;
pub use subscriber::{EventSubscriber, Handler, SubscribeOptions, Subscription};
pub use tracer::{
    EventStats, MessageId, MessageTrace, MessageTracer, SubscriberResult, TraceNode,
};

/// Default capacity of the message trace ring buffer.
pub const DEFAULT_MAX_TRACE_SIZE: usize = 1000;

/// Default limit on re-entrant emit nesting per thread.
pub const DEFAULT_MAX_EMIT_DEPTH: usize = 64;
