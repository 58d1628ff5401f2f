use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::BillingConfig;

/// Subscription tier a workspace is entitled to. Ordering follows price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Business,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Business => "business",
        }
    }

    pub fn is_paid(&self) -> bool {
        !matches!(self, Plan::Free)
    }
}

impl fmt::Display for Plan {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maps provider price ids to plan tiers.
///
/// A price id the catalog does not know usually means the price went live
/// before the deploy that names it. Resolution falls back to the configured
/// default paid tier, never to Free: the customer is demonstrably paying,
/// and a silent downgrade would cut off features mid-subscription.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    price_plans: HashMap<String, Plan>,
    default_paid: Plan,
}

impl PlanCatalog {
    pub fn new(
        price_plans: HashMap<String, Plan>,
        default_paid: Plan,
    ) -> Self {
        PlanCatalog {
            price_plans,
            default_paid,
        }
    }

    pub fn from_config(config: &BillingConfig) -> Self {
        Self::new(config.price_plans.clone(), config.default_paid_plan)
    }

    /// Resolves the plan for a subscription's price id. `None` means the
    /// payload carried no line items at all.
    pub fn plan_for(
        &self,
        price_id: Option<&str>,
    ) -> Plan {
        match price_id {
            Some(id) => match self.price_plans.get(id) {
                Some(plan) => *plan,
                None => {
                    warn!(
                        "price id {} missing from catalog, assuming {}",
                        id, self.default_paid
                    );
                    self.default_paid
                }
            },
            None => self.default_paid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> PlanCatalog {
        let mut price_plans = HashMap::new();
        price_plans.insert("price_pro_monthly".to_string(), Plan::Pro);
        price_plans.insert("price_biz_monthly".to_string(), Plan::Business);
        PlanCatalog::new(price_plans, Plan::Pro)
    }

    #[test]
    fn known_price_ids_resolve_from_the_catalog() {
        let catalog = catalog();
        assert_eq!(catalog.plan_for(Some("price_pro_monthly")), Plan::Pro);
        assert_eq!(catalog.plan_for(Some("price_biz_monthly")), Plan::Business);
    }

    #[test]
    fn unknown_price_id_falls_back_to_the_default_paid_tier() {
        assert_eq!(catalog().plan_for(Some("price_enterprise_beta")), Plan::Pro);
    }

    #[test]
    fn missing_price_id_falls_back_to_the_default_paid_tier() {
        assert_eq!(catalog().plan_for(None), Plan::Pro);
    }

    #[test]
    fn plan_ordering_follows_price() {
        assert!(Plan::Free < Plan::Pro);
        assert!(Plan::Pro < Plan::Business);
        assert!(!Plan::Free.is_paid());
        assert!(Plan::Business.is_paid());
    }
}
