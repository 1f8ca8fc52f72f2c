//! # Plexus Test Suite
//!
//! Unified test crate for flows that cross crate boundaries.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/
//! │   └── bus_benchmarks.rs   # Emit throughput, tracing on/off
//! └── src/
//!     ├── fixtures.rs         # Shared test features and bus helpers
//!     └── integration/        # Bus + runtime choreography
//!         ├── cascade_tracing.rs
//!         ├── feature_lifecycle.rs
//!         └── services_and_state.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p plexus-tests
//!
//! # By category
//! cargo test -p plexus-tests integration::cascade_tracing
//! cargo test -p plexus-tests integration::feature_lifecycle
//!
//! # Benchmarks
//! cargo bench -p plexus-tests
//! ```

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod fixtures;
