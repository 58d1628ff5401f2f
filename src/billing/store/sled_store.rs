use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::BillingStore;
use crate::BillingRecord;
use crate::RecordDraft;
use crate::RecordKeys;
use crate::Result;
use crate::StatusPatch;
use crate::UpsertOutcome;

/// Sled tree namespaces
const RECORDS_NAMESPACE: &str = "billing_records";
const CUSTOMERS_NAMESPACE: &str = "billing_customers";

/// Embedded record store.
///
/// Records live in one tree under `sub:<id>` (or `cus:<id>` until a
/// subscription id is adopted); a second tree maps each customer id to the
/// primary key of its current record. A single operation lock serializes
/// every access, so a located record cannot move under a writer.
#[derive(Clone)]
pub struct SledBillingStore {
    db: Arc<sled::Db>,
    records: Arc<sled::Tree>,
    customers: Arc<sled::Tree>,
    lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for SledBillingStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledBillingStore")
            .field("records_len", &self.records.len())
            .finish()
    }
}

impl Drop for SledBillingStore {
    fn drop(&mut self) {
        match self.db.flush() {
            Ok(bytes) => info!("flushed billing db, {} bytes", bytes),
            Err(e) => error!("failed to flush billing db: {:?}", e),
        }
    }
}

impl SledBillingStore {
    pub fn new(db: Arc<sled::Db>) -> Result<Self> {
        let records = db.open_tree(RECORDS_NAMESPACE)?;
        let customers = db.open_tree(CUSTOMERS_NAMESPACE)?;
        Ok(SledBillingStore {
            db,
            records: Arc::new(records),
            customers: Arc::new(customers),
            lock: Arc::new(Mutex::new(())),
        })
    }

    fn primary_key(record: &BillingRecord) -> Vec<u8> {
        match (&record.external_subscription_id, &record.external_customer_id) {
            (Some(subscription), _) => format!("sub:{}", subscription).into_bytes(),
            (None, Some(customer)) => format!("cus:{}", customer).into_bytes(),
            (None, None) => unreachable!("record carries no external id"),
        }
    }

    fn decode(bytes: &[u8]) -> Result<BillingRecord> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Caller must hold `lock`.
    fn locate(
        &self,
        keys: &RecordKeys,
    ) -> Result<Option<(Vec<u8>, BillingRecord)>> {
        if let Some(subscription) = &keys.subscription {
            let key = format!("sub:{}", subscription).into_bytes();
            if let Some(bytes) = self.records.get(&key)? {
                return Ok(Some((key, Self::decode(&bytes)?)));
            }
            if let Some(customer) = &keys.customer {
                if let Some((key, record)) = self.customer_record(customer)? {
                    // Adoptable only while unbound; a record bound to a
                    // different subscription stays as history.
                    if record.external_subscription_id.is_none() {
                        return Ok(Some((key, record)));
                    }
                }
            }
            return Ok(None);
        }

        if let Some(customer) = &keys.customer {
            return self.customer_record(customer);
        }

        Ok(None)
    }

    fn customer_record(
        &self,
        customer: &str,
    ) -> Result<Option<(Vec<u8>, BillingRecord)>> {
        let Some(pointer) = self.customers.get(customer.as_bytes())? else {
            return Ok(None);
        };
        match self.records.get(&pointer)? {
            Some(bytes) => Ok(Some((pointer.to_vec(), Self::decode(&bytes)?))),
            None => {
                warn!(
                    "customer index for {} points at a missing record, ignoring",
                    customer
                );
                Ok(None)
            }
        }
    }

    /// Caller must hold `lock`. Inserts under the new key before removing
    /// the old one, so an interrupted move duplicates rather than loses.
    fn write_record(
        &self,
        old_key: Option<&[u8]>,
        record: &BillingRecord,
    ) -> Result<()> {
        let new_key = Self::primary_key(record);
        self.records
            .insert(new_key.as_slice(), bincode::serialize(record)?)?;
        if let Some(customer) = &record.external_customer_id {
            self.customers
                .insert(customer.as_bytes(), new_key.as_slice())?;
        }
        if let Some(old_key) = old_key {
            if old_key != new_key.as_slice() {
                self.records.remove(old_key)?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BillingStore for SledBillingStore {
    async fn find(
        &self,
        keys: &RecordKeys,
    ) -> Result<Option<BillingRecord>> {
        let _guard = self.lock.lock();
        Ok(self.locate(keys)?.map(|(_, record)| record))
    }

    async fn upsert(
        &self,
        keys: &RecordKeys,
        draft: &RecordDraft,
    ) -> Result<UpsertOutcome> {
        debug_assert!(!keys.is_empty(), "upsert requires at least one external id");
        let _guard = self.lock.lock();
        match self.locate(keys)? {
            Some((old_key, mut record)) => {
                record.apply_draft(keys, draft);
                self.write_record(Some(&old_key), &record)?;
                Ok(UpsertOutcome::Updated(record))
            }
            None => {
                let record = BillingRecord::from_draft(keys, draft);
                self.write_record(None, &record)?;
                Ok(UpsertOutcome::Created(record))
            }
        }
    }

    async fn patch(
        &self,
        keys: &RecordKeys,
        patch: &StatusPatch,
    ) -> Result<Option<BillingRecord>> {
        let _guard = self.lock.lock();
        match self.locate(keys)? {
            Some((key, mut record)) => {
                record.apply_patch(patch);
                self.write_record(Some(&key), &record)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn workspace_record(
        &self,
        workspace_id: &str,
    ) -> Result<Option<BillingRecord>> {
        let _guard = self.lock.lock();
        let mut best: Option<BillingRecord> = None;
        for item in self.records.iter() {
            let (_, bytes) = item?;
            let record = Self::decode(&bytes)?;
            if record.workspace_id == workspace_id
                && best
                    .as_ref()
                    .map_or(true, |current| record.updated_at >= current.updated_at)
            {
                best = Some(record);
            }
        }
        Ok(best)
    }
}
