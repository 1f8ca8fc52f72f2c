//! Structured logging helpers.
//!
//! Records produced through these macros share a consistent shape that JSON
//! log shippers can index:
//! - `feature`: Feature name (search, viewer, etc.), or `runtime` for the host
//! - `event`: Bus event name, when the record concerns one
//! - Additional context fields

/// Log a record stamped with the emitting feature.
///
/// Everything after the feature is passed through to the `tracing` macro, so
/// extra fields and format arguments work as usual:
///
/// ```rust,ignore
/// log_event!(info, "search", documents = 12, "index rebuilt in {}ms", elapsed);
/// ```
#[macro_export]
macro_rules! log_event {
    ($level:ident, $feature:expr, $($arg:tt)+) => {
        tracing::$level!(feature = %$feature, $($arg)+)
    };
}

/// Log a bus-related record with standard fields.
#[macro_export]
macro_rules! log_bus_event {
    ($level:ident, $feature:expr, $msg:expr, $event:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            feature = $feature,
            event = %$event,
            $($($field)*,)?
            $msg
        )
    };
}
