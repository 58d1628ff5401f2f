use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use autometrics::autometrics;
#[cfg(test)]
use mockall::automock;
use nanoid::nanoid;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::normalize_status;
use crate::utils::time::unix_now_ms;
use crate::BillingConfig;
use crate::BillingError;
use crate::BillingEventKind;
use crate::BillingStore;
use crate::PlanCatalog;
use crate::RecordDraft;
use crate::RecordKeys;
use crate::Result;
use crate::StatusPatch;
use crate::SubscriptionStatus;
use crate::UpsertOutcome;
use crate::VerifiedEvent;
use crate::WebhookVerifier;
use crate::API_SLO;
use crate::BILLING_TRANSITIONS;

/// Maps external customer ids onto workspaces.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CustomerDirectory: Send + Sync + 'static {
    /// The workspace that claimed this customer id, if any.
    async fn resolve(
        &self,
        customer_id: &str,
    ) -> Result<Option<String>>;
}

/// Directory backed by the static config mapping.
pub struct StaticDirectory {
    customer_workspaces: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new(customer_workspaces: HashMap<String, String>) -> Self {
        StaticDirectory {
            customer_workspaces,
        }
    }

    pub fn from_config(config: &BillingConfig) -> Self {
        Self::new(config.customer_workspaces.clone())
    }
}

#[async_trait]
impl CustomerDirectory for StaticDirectory {
    async fn resolve(
        &self,
        customer_id: &str,
    ) -> Result<Option<String>> {
        Ok(self.customer_workspaces.get(customer_id).cloned())
    }
}

/// Why an admitted event produced no write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// No workspace claims the customer id the event carries.
    UnresolvedWorkspace { customer_id: String },
    /// The payload carried no identifier that could locate or create
    /// a record.
    MissingIdentifiers,
    /// A patch event arrived for a record that does not exist.
    NoMatchingRecord,
}

/// Outcome of reconciling one admitted delivery.
///
/// Only signature and parse failures are errors; an event that cannot be
/// applied is `Dropped` with a reason and still acknowledged, so the
/// provider does not redeliver it forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Created { workspace_id: String },
    Updated { workspace_id: String },
    Ignored { event_type: String },
    Dropped { reason: DropReason },
}

impl Reconciliation {
    /// Stable label for metrics and response bodies.
    pub fn label(&self) -> &'static str {
        match self {
            Reconciliation::Created { .. } => "created",
            Reconciliation::Updated { .. } => "updated",
            Reconciliation::Ignored { .. } => "ignored",
            Reconciliation::Dropped { .. } => "dropped",
        }
    }
}

/// Folds billing webhook deliveries into per-workspace records.
pub struct Reconciler {
    verifier: WebhookVerifier,
    catalog: PlanCatalog,
    store: Arc<dyn BillingStore>,
    directory: Arc<dyn CustomerDirectory>,
}

impl Reconciler {
    pub fn new(
        verifier: WebhookVerifier,
        catalog: PlanCatalog,
        store: Arc<dyn BillingStore>,
        directory: Arc<dyn CustomerDirectory>,
    ) -> Self {
        Reconciler {
            verifier,
            catalog,
            store,
            directory,
        }
    }

    /// Admits and reconciles one webhook delivery.
    ///
    /// The signature check is the sole admission gate and runs before the
    /// payload is parsed or any record is touched. A delivery that cannot
    /// prove its origin learns nothing from the response but the rejection.
    #[autometrics(objective = API_SLO)]
    pub async fn process(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<Reconciliation> {
        let delivery_id = nanoid!();
        let header =
            signature.ok_or(BillingError::SignatureInvalid("missing signature header"))?;
        self.verifier.verify(payload, header)?;

        let event = VerifiedEvent::parse(payload)?;
        debug!(
            "delivery {}: admitted {} ({})",
            delivery_id, event.event_type, event.event_id
        );

        let outcome = self.reconcile(&event).await?;
        info!(
            "delivery {}: {} -> {}",
            delivery_id,
            event.event_type,
            outcome.label()
        );
        Ok(outcome)
    }

    async fn reconcile(
        &self,
        event: &VerifiedEvent,
    ) -> Result<Reconciliation> {
        let arrived_at = unix_now_ms() as u64;
        match event.kind {
            BillingEventKind::SubscriptionCreated | BillingEventKind::SubscriptionUpdated => {
                self.apply_subscription(event, arrived_at).await
            }
            BillingEventKind::SubscriptionDeleted => {
                let subscription = event.subscription()?;
                let keys = RecordKeys {
                    customer: subscription.customer.clone(),
                    subscription: Some(subscription.id.clone()),
                };
                self.apply_patch(
                    keys,
                    StatusPatch {
                        status: SubscriptionStatus::Canceled,
                        cancel_at_period_end: None,
                        updated_at: arrived_at,
                    },
                )
                .await
            }
            BillingEventKind::InvoicePaid => {
                let invoice = event.invoice()?;
                let keys = RecordKeys {
                    customer: invoice.customer,
                    subscription: invoice.subscription,
                };
                self.apply_patch(
                    keys,
                    StatusPatch {
                        status: SubscriptionStatus::Active,
                        cancel_at_period_end: None,
                        updated_at: arrived_at,
                    },
                )
                .await
            }
            BillingEventKind::InvoicePaymentFailed => {
                let invoice = event.invoice()?;
                let keys = RecordKeys {
                    customer: invoice.customer,
                    subscription: invoice.subscription,
                };
                self.apply_patch(
                    keys,
                    StatusPatch {
                        status: SubscriptionStatus::PastDue,
                        cancel_at_period_end: None,
                        updated_at: arrived_at,
                    },
                )
                .await
            }
            BillingEventKind::CheckoutCompleted => self.apply_checkout(event, arrived_at).await,
            BillingEventKind::Unrecognized => {
                debug!("event type {} carries nothing to reconcile", event.event_type);
                Ok(Reconciliation::Ignored {
                    event_type: event.event_type.clone(),
                })
            }
        }
    }

    /// Full-state upsert from a subscription payload. The record's
    /// workspace comes from the existing record when one matches, otherwise
    /// from resolving the customer id.
    async fn apply_subscription(
        &self,
        event: &VerifiedEvent,
        arrived_at: u64,
    ) -> Result<Reconciliation> {
        let subscription = event.subscription()?;
        let keys = RecordKeys {
            customer: subscription.customer.clone(),
            subscription: Some(subscription.id.clone()),
        };

        let workspace_id = match self.store.find(&keys).await? {
            Some(record) => record.workspace_id,
            None => match self.workspace_for(keys.customer.as_deref()).await? {
                Ok(workspace_id) => workspace_id,
                Err(reason) => return Ok(Reconciliation::Dropped { reason }),
            },
        };

        let draft = RecordDraft {
            workspace_id,
            plan: self.catalog.plan_for(subscription.price_id()),
            status: normalize_status(subscription.status.as_deref()),
            cancel_at_period_end: subscription.cancel_at_period_end,
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
            updated_at: arrived_at,
        };
        self.write_upsert(&keys, &draft).await
    }

    /// A completed checkout confirms the purchase before the subscription
    /// events arrive. An existing record just goes active; otherwise a
    /// minimal paid record is created and the subscription events fill in
    /// the rest later.
    async fn apply_checkout(
        &self,
        event: &VerifiedEvent,
        arrived_at: u64,
    ) -> Result<Reconciliation> {
        let checkout = event.checkout()?;
        let keys = RecordKeys {
            customer: checkout.customer.clone(),
            subscription: checkout.subscription.clone(),
        };
        if keys.is_empty() {
            return Ok(Reconciliation::Dropped {
                reason: DropReason::MissingIdentifiers,
            });
        }

        if self.store.find(&keys).await?.is_some() {
            return self
                .apply_patch(
                    keys,
                    StatusPatch {
                        status: SubscriptionStatus::Active,
                        cancel_at_period_end: None,
                        updated_at: arrived_at,
                    },
                )
                .await;
        }

        let workspace_id = match self.workspace_for(keys.customer.as_deref()).await? {
            Ok(workspace_id) => workspace_id,
            Err(reason) => return Ok(Reconciliation::Dropped { reason }),
        };
        let draft = RecordDraft {
            workspace_id,
            plan: self.catalog.plan_for(None),
            status: SubscriptionStatus::Active,
            cancel_at_period_end: false,
            current_period_start: None,
            current_period_end: None,
            updated_at: arrived_at,
        };
        self.write_upsert(&keys, &draft).await
    }

    async fn apply_patch(
        &self,
        keys: RecordKeys,
        patch: StatusPatch,
    ) -> Result<Reconciliation> {
        if keys.is_empty() {
            return Ok(Reconciliation::Dropped {
                reason: DropReason::MissingIdentifiers,
            });
        }
        match self.store.patch(&keys, &patch).await? {
            Some(record) => {
                BILLING_TRANSITIONS
                    .with_label_values(&[patch.status.as_str()])
                    .inc();
                Ok(Reconciliation::Updated {
                    workspace_id: record.workspace_id,
                })
            }
            None => {
                warn!("no billing record matches {:?}, dropping patch", keys);
                Ok(Reconciliation::Dropped {
                    reason: DropReason::NoMatchingRecord,
                })
            }
        }
    }

    async fn write_upsert(
        &self,
        keys: &RecordKeys,
        draft: &RecordDraft,
    ) -> Result<Reconciliation> {
        let outcome = self.store.upsert(keys, draft).await?;
        BILLING_TRANSITIONS
            .with_label_values(&[draft.status.as_str()])
            .inc();
        Ok(match outcome {
            UpsertOutcome::Created(record) => Reconciliation::Created {
                workspace_id: record.workspace_id,
            },
            UpsertOutcome::Updated(record) => Reconciliation::Updated {
                workspace_id: record.workspace_id,
            },
        })
    }

    /// Resolves the workspace for a brand-new record, or the drop reason
    /// when it cannot be done.
    async fn workspace_for(
        &self,
        customer: Option<&str>,
    ) -> Result<std::result::Result<String, DropReason>> {
        let Some(customer) = customer else {
            return Ok(Err(DropReason::MissingIdentifiers));
        };
        match self.directory.resolve(customer).await? {
            Some(workspace_id) => Ok(Ok(workspace_id)),
            None => {
                warn!("customer {} resolves to no workspace, dropping event", customer);
                Ok(Err(DropReason::UnresolvedWorkspace {
                    customer_id: customer.to_string(),
                }))
            }
        }
    }
}
