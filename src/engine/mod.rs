//! Assembly and lifecycle of the sync core.
//!
//! [`EngineBuilder`] wires the change-feed router and the billing
//! reconciler from [`Settings`](crate::Settings), with setters to swap any
//! component for a custom implementation. [`Engine`] owns the wired pair
//! and parks until the shutdown signal fires.

mod builder;
mod engine;

pub use builder::*;
pub use engine::*;
