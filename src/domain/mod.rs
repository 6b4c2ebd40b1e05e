//! Domain layer - pure traffic-shaping logic with no runtime dependencies.
//!
//! This layer contains the core concepts and invariants:
//! - Epoch-aligned window math and lazily reset window state
//! - Scope keys, group ids and limiter arguments
//! - Request priorities and the priority heap
//! - Window strategies and remedy configuration
//!
//! Nothing here reads the clock; every time-dependent operation takes `now`.

pub mod priority;
pub mod scope;
pub mod strategy;
pub mod window;
