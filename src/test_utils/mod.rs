//! Test doubles and builders shared across unit tests.

mod builders;
mod doubles;

pub use builders::*;
pub use doubles::*;
