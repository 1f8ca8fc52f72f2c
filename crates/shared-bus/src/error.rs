//! # Bus Errors
//!
//! Errors surfaced synchronously to publishers and subscribers.
//! Handler failures are never represented here: they are caught at the
//! dispatch boundary and recorded in the message trace instead.

use thiserror::Error;

/// Errors from event bus operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The event name is neither scoped (`@scope/name`) nor in the catalog.
    #[error("Unknown global event '{event}' (not in event catalog and not scoped)")]
    UnknownEvent { event: String },

    /// The event name is empty or malformed.
    #[error("Invalid event name '{event}': {reason}")]
    InvalidEventName { event: String, reason: String },

    /// Nested emits exceeded the configured depth on this thread.
    #[error("Emit of '{event}' exceeded maximum nesting depth {depth}")]
    RecursionLimit { event: String, depth: usize },

    /// The bus backing a scoped wrapper or subscription has been dropped.
    #[error("Event bus closed")]
    Closed,
}
