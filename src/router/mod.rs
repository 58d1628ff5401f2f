//! Change-feed subscription router.
//!
//! Keeps client-held cached query results consistent with the remote store
//! by reacting to its push notification stream. Subscriptions declare which
//! cache keys depend on which entity changes; the router listens on shared
//! per-(entity, filter) channels and invalidates the declared keys whenever
//! a matching change arrives.
//!
//! The router never patches cached values from event payloads. Events carry
//! identifying fields only, so applying them directly could persist partial
//! rows; invalidation forces an authoritative re-fetch instead.

mod subscription;
mod target;
pub use subscription::*;
pub use target::*;
