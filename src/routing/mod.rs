//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     add_group(base, registrant)   (router.rs, stored only)
//!     → register_all()              (router.rs, runs each registrant once)
//!     → ActionGroup::get/post/ws    (group.rs)
//!     → policy activated            (policy.rs)
//!     → chain(method filter(handler)) installed in the route table (table.rs)
//!
//! Request:
//!     (method, path, upgrade?) → table.rs → handler
//! ```
//!
//! # Design Decisions
//! - Exact path matching; the table is read-mostly behind an `RwLock`
//! - Last registration wins, with a warning
//! - Route table and group policies are owned services shared via `Arc`

pub mod action;
pub mod group;
pub mod policy;
pub mod router;
pub mod table;

pub use action::{Action, ActionResult, ContentAction, WsAction};
pub use group::ActionGroup;
pub use policy::{GroupPolicies, GroupPolicy};
pub use router::ActionRouter;
pub use table::{RouteInfo, RouteTable};
