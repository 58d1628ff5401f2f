use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

/// Provider subscription lifecycle states, collapsed to the four the
/// application reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Whether the workspace keeps access to paid features in this state.
    /// Past-due subscriptions do: the provider is still retrying payment.
    pub fn grants_access(&self) -> bool {
        !matches!(self, SubscriptionStatus::Canceled)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Collapses a raw provider status string onto the local state set.
///
/// Terminal provider states (`incomplete_expired`, `unpaid`, `canceled`) all
/// map to `Canceled`. Anything unrecognized maps to `Active`: new provider
/// states appear without notice, and misreading one as a cancellation would
/// lock a paying workspace out.
pub fn normalize_status(raw: Option<&str>) -> SubscriptionStatus {
    match raw {
        Some("active") => SubscriptionStatus::Active,
        Some("trialing") => SubscriptionStatus::Trialing,
        Some("past_due") => SubscriptionStatus::PastDue,
        Some("canceled") | Some("unpaid") | Some("incomplete_expired") => {
            SubscriptionStatus::Canceled
        }
        Some(other) => {
            debug!("unrecognized subscription status {:?}, treating as active", other);
            SubscriptionStatus::Active
        }
        None => SubscriptionStatus::Active,
    }
}
