//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Locked window counters and grouped counter state
//! - Keyed rate limiters (by endpoint, by limiter id)
//! - Delayed admission queues and their registry
//! - Strategy-based threshold throttling
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod counter;
pub mod limiter;
pub mod metrics;
pub mod ports;
pub mod queue;
pub mod registry;
pub mod throttle;
