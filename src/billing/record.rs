use serde::Deserialize;
use serde::Serialize;

use crate::Plan;
use crate::SubscriptionStatus;

/// Persisted billing state for one workspace.
///
/// External identifiers are optional because records can be born from either
/// side of the provider's object model: a checkout knows the customer before
/// any subscription exists, a subscription event knows both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingRecord {
    pub workspace_id: String,
    pub external_customer_id: Option<String>,
    pub external_subscription_id: Option<String>,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<u64>,
    pub current_period_end: Option<u64>,
    /// Arrival time of the delivery that last wrote this record, unix ms.
    /// Conflicts resolve by arrival, so this is the record's version.
    pub updated_at: u64,
}

/// External identifiers addressing a record. At least one must be present
/// for any store operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordKeys {
    pub customer: Option<String>,
    pub subscription: Option<String>,
}

impl RecordKeys {
    pub fn customer(id: impl Into<String>) -> Self {
        RecordKeys {
            customer: Some(id.into()),
            subscription: None,
        }
    }

    pub fn subscription(id: impl Into<String>) -> Self {
        RecordKeys {
            customer: None,
            subscription: Some(id.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.customer.is_none() && self.subscription.is_none()
    }
}

/// Full desired record state derived from a subscription payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub workspace_id: String,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<u64>,
    pub current_period_end: Option<u64>,
    pub updated_at: u64,
}

/// Narrow status update derived from lifecycle and invoice events. Leaves
/// plan, periods and external identifiers untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPatch {
    pub status: SubscriptionStatus,
    pub cancel_at_period_end: Option<bool>,
    pub updated_at: u64,
}

/// What an upsert did to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(BillingRecord),
    Updated(BillingRecord),
}

impl UpsertOutcome {
    pub fn record(&self) -> &BillingRecord {
        match self {
            UpsertOutcome::Created(record) | UpsertOutcome::Updated(record) => record,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

impl BillingRecord {
    /// Materializes a brand-new record from a draft.
    pub fn from_draft(
        keys: &RecordKeys,
        draft: &RecordDraft,
    ) -> Self {
        BillingRecord {
            workspace_id: draft.workspace_id.clone(),
            external_customer_id: keys.customer.clone(),
            external_subscription_id: keys.subscription.clone(),
            plan: draft.plan,
            status: draft.status,
            cancel_at_period_end: draft.cancel_at_period_end,
            current_period_start: draft.current_period_start,
            current_period_end: draft.current_period_end,
            updated_at: draft.updated_at,
        }
    }

    /// Overwrites the record with the draft, adopting any external ids the
    /// keys carry that the record does not know yet.
    pub fn apply_draft(
        &mut self,
        keys: &RecordKeys,
        draft: &RecordDraft,
    ) {
        self.workspace_id = draft.workspace_id.clone();
        self.plan = draft.plan;
        self.status = draft.status;
        self.cancel_at_period_end = draft.cancel_at_period_end;
        self.current_period_start = draft.current_period_start;
        self.current_period_end = draft.current_period_end;
        self.updated_at = draft.updated_at;
        if let Some(customer) = &keys.customer {
            self.external_customer_id = Some(customer.clone());
        }
        if let Some(subscription) = &keys.subscription {
            self.external_subscription_id = Some(subscription.clone());
        }
    }

    pub fn apply_patch(
        &mut self,
        patch: &StatusPatch,
    ) {
        self.status = patch.status;
        if let Some(cancel) = patch.cancel_at_period_end {
            self.cancel_at_period_end = cancel;
        }
        self.updated_at = patch.updated_at;
    }
}
