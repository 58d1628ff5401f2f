use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::BillingError;
use crate::Result;

/// Webhook event families the reconciler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingEventKind {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionDeleted,
    InvoicePaid,
    InvoicePaymentFailed,
    CheckoutCompleted,
    Unrecognized,
}

impl BillingEventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "customer.subscription.created" => BillingEventKind::SubscriptionCreated,
            "customer.subscription.updated" => BillingEventKind::SubscriptionUpdated,
            "customer.subscription.deleted" => BillingEventKind::SubscriptionDeleted,
            "invoice.paid" => BillingEventKind::InvoicePaid,
            "invoice.payment_failed" => BillingEventKind::InvoicePaymentFailed,
            "checkout.session.completed" => BillingEventKind::CheckoutCompleted,
            _ => BillingEventKind::Unrecognized,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: u64,
    data: EnvelopeData,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    object: Value,
}

/// An admitted delivery: signature already proven, envelope decoded, inner
/// payload object still raw until an event-specific accessor types it.
#[derive(Debug)]
pub struct VerifiedEvent {
    pub event_id: String,
    pub event_type: String,
    pub created: u64,
    pub kind: BillingEventKind,
    object: Value,
}

impl VerifiedEvent {
    /// Decodes the envelope of a delivery that already passed the
    /// signature gate.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(payload)
            .map_err(|e| BillingError::MalformedPayload(e.to_string()))?;
        let kind = BillingEventKind::from_type(&envelope.event_type);
        Ok(VerifiedEvent {
            event_id: envelope.id,
            event_type: envelope.event_type,
            created: envelope.created,
            kind,
            object: envelope.data.object,
        })
    }

    pub fn subscription(&self) -> Result<SubscriptionObject> {
        self.object_as("subscription")
    }

    pub fn invoice(&self) -> Result<InvoiceObject> {
        self.object_as("invoice")
    }

    pub fn checkout(&self) -> Result<CheckoutObject> {
        self.object_as("checkout session")
    }

    fn object_as<T: DeserializeOwned>(
        &self,
        what: &str,
    ) -> Result<T> {
        serde_json::from_value(self.object.clone())
            .map_err(|e| BillingError::MalformedPayload(format!("{} object: {}", what, e)).into())
    }
}

/// Subscription payload fields the reconciler reads. Everything beyond the
/// id is optional; providers trim payloads without notice.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub customer: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    pub current_period_start: Option<u64>,
    pub current_period_end: Option<u64>,
    #[serde(default)]
    items: Option<SubscriptionItems>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubscriptionItems {
    #[serde(default)]
    data: Vec<SubscriptionItem>,
}

#[derive(Debug, Clone, Deserialize)]
struct SubscriptionItem {
    price: Option<PriceRef>,
}

#[derive(Debug, Clone, Deserialize)]
struct PriceRef {
    id: String,
}

impl SubscriptionObject {
    /// Price id of the first line item, if the payload carries any.
    pub fn price_id(&self) -> Option<&str> {
        self.items
            .as_ref()?
            .data
            .first()?
            .price
            .as_ref()
            .map(|price| price.id.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    pub customer: Option<String>,
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutObject {
    pub customer: Option<String>,
    pub subscription: Option<String>,
}
