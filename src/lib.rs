mod billing;
mod cache;
mod config;
mod engine;
mod errors;
mod feed;
mod metrics;
mod router;
mod webhook;
pub mod utils;

pub use billing::*;
pub use cache::*;
pub use config::*;
pub use engine::*;
pub use errors::*;
pub use feed::*;
pub use metrics::*;
pub use router::*;
pub use utils::*;
pub use webhook::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;
//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
