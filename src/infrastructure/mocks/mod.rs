//! Mock implementations for testing.
//!
//! This module provides test doubles for infrastructure adapters,
//! enabling controlled testing of window roll-over and TTL expiry.

pub mod clock;

pub use clock::MockClock;
