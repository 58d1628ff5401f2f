//! Billing event reconciler.
//!
//! Ingests payment-provider webhooks and folds them into per-workspace
//! billing records. Signature verification is the only admission gate:
//! before any payload parsing or record lookup, a delivery must prove it
//! came from the provider. Admitted events reconcile best-effort, with
//! arrival order winning conflicts; an event that cannot be applied is
//! dropped with a reason and still acknowledged.

mod event;
mod plan;
mod reconciler;
mod record;
mod status;
mod store;
mod verify;

pub use event::*;
pub use plan::*;
pub use reconciler::*;
pub use record::*;
pub use status::*;
pub use store::*;
pub use verify::*;

#[cfg(test)]
mod verify_test;
