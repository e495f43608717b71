//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (inside the middleware chain):
//!     → traffic_guard.rs (per client and path admission)
//!     → Pass to access log and the route's handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject when the admission bookkeeping fails
//! - Client identity comes from forwarding headers, then the socket peer

pub mod traffic_guard;

pub use traffic_guard::{Admission, RatePolicy, SlidingWindow, TokenBucket, TrafficGuard};
