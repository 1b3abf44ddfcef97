//! Shared domain types and pure orchestration rules for Bridgewatch.
//!
//! Nothing in this crate performs I/O. The runtime crate owns the network
//! boundary and the event loop; everything here is a value or a function of
//! values, so transitions can be asserted on directly.

pub mod audit;
pub mod error;
pub mod evidence;
pub mod nudge;
pub mod permissions;
pub mod recurrence;
pub mod registry;
pub mod roles;
pub mod schema;
pub mod situation;
