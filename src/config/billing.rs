use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Plan;
use crate::Result;

/// Backend for persisted billing records
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BillingStoreKind {
    Memory,
    Sled,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BillingConfig {
    /// Shared secret for webhook signature verification. All deliveries
    /// are rejected while this is empty.
    #[serde(default)]
    pub webhook_secret: String,

    /// Maximum accepted age of a signed delivery in seconds (0 disables
    /// the freshness check)
    #[serde(default = "default_signature_tolerance_secs")]
    pub signature_tolerance_secs: u64,

    /// Provider price id -> plan tier
    #[serde(default)]
    pub price_plans: HashMap<String, Plan>,

    /// Plan assumed when a price id is missing from `price_plans`
    #[serde(default = "default_paid_plan")]
    pub default_paid_plan: Plan,

    /// Record store backend
    #[serde(default = "default_store")]
    pub store: BillingStoreKind,

    /// Sled database directory (ignored by the memory store)
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    /// External customer id -> workspace id
    #[serde(default)]
    pub customer_workspaces: HashMap<String, String>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            webhook_secret: String::new(),
            signature_tolerance_secs: default_signature_tolerance_secs(),
            price_plans: HashMap::new(),
            default_paid_plan: default_paid_plan(),
            store: default_store(),
            store_path: default_store_path(),
            customer_workspaces: HashMap::new(),
        }
    }
}

impl BillingConfig {
    /// Validates billing configuration consistency
    /// # Errors
    /// Returns `Error::InvalidConfig` if any configuration rules are violated
    pub fn validate(&self) -> Result<()> {
        // Unknown price ids fall back to this plan; a free fallback would
        // silently downgrade paying customers
        if self.default_paid_plan == Plan::Free {
            return Err(Error::InvalidConfig(
                "billing.default_paid_plan must be a paid tier".into(),
            ));
        }

        for (price_id, plan) in &self.price_plans {
            if price_id.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "billing.price_plans contains an empty price id (mapped to {:?})",
                    plan
                )));
            }
        }

        if self.webhook_secret.is_empty() {
            tracing::warn!("billing.webhook_secret is empty; every webhook delivery will be rejected");
        }

        Ok(())
    }
}

fn default_signature_tolerance_secs() -> u64 {
    300
}
fn default_paid_plan() -> Plan {
    Plan::Pro
}
fn default_store() -> BillingStoreKind {
    BillingStoreKind::Memory
}
fn default_store_path() -> PathBuf {
    PathBuf::from("/tmp/tidemark/billing")
}
