use async_trait::async_trait;
use parking_lot::RwLock;

use super::BillingStore;
use crate::BillingRecord;
use crate::RecordDraft;
use crate::RecordKeys;
use crate::Result;
use crate::StatusPatch;
use crate::UpsertOutcome;

/// In-process record store backed by a vector.
///
/// Every operation takes the whole-store lock, which makes upserts atomic
/// for free. Webhook volume is tiny, so the linear scans never matter.
#[derive(Default)]
pub struct MemoryBillingStore {
    records: RwLock<Vec<BillingRecord>>,
}

impl MemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn position(
        records: &[BillingRecord],
        keys: &RecordKeys,
    ) -> Option<usize> {
        if let Some(subscription) = &keys.subscription {
            if let Some(index) = records
                .iter()
                .position(|r| r.external_subscription_id.as_deref() == Some(subscription))
            {
                return Some(index);
            }
            // A customer-addressed record without a subscription yet may
            // adopt this one; a record bound elsewhere may not.
            if let Some(customer) = &keys.customer {
                return records.iter().position(|r| {
                    r.external_subscription_id.is_none()
                        && r.external_customer_id.as_deref() == Some(customer)
                });
            }
            return None;
        }

        if let Some(customer) = &keys.customer {
            return records
                .iter()
                .enumerate()
                .filter(|(_, r)| r.external_customer_id.as_deref() == Some(customer))
                .max_by_key(|(_, r)| r.updated_at)
                .map(|(index, _)| index);
        }

        None
    }
}

#[async_trait]
impl BillingStore for MemoryBillingStore {
    async fn find(
        &self,
        keys: &RecordKeys,
    ) -> Result<Option<BillingRecord>> {
        let records = self.records.read();
        Ok(Self::position(&records, keys).map(|index| records[index].clone()))
    }

    async fn upsert(
        &self,
        keys: &RecordKeys,
        draft: &RecordDraft,
    ) -> Result<UpsertOutcome> {
        debug_assert!(!keys.is_empty(), "upsert requires at least one external id");
        let mut records = self.records.write();
        match Self::position(&records, keys) {
            Some(index) => {
                let record = &mut records[index];
                record.apply_draft(keys, draft);
                Ok(UpsertOutcome::Updated(record.clone()))
            }
            None => {
                let record = BillingRecord::from_draft(keys, draft);
                records.push(record.clone());
                Ok(UpsertOutcome::Created(record))
            }
        }
    }

    async fn patch(
        &self,
        keys: &RecordKeys,
        patch: &StatusPatch,
    ) -> Result<Option<BillingRecord>> {
        let mut records = self.records.write();
        match Self::position(&records, keys) {
            Some(index) => {
                let record = &mut records[index];
                record.apply_patch(patch);
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn workspace_record(
        &self,
        workspace_id: &str,
    ) -> Result<Option<BillingRecord>> {
        let records = self.records.read();
        Ok(records
            .iter()
            .filter(|r| r.workspace_id == workspace_id)
            .max_by_key(|r| r.updated_at)
            .cloned())
    }
}
