//! Billing record persistence.

mod memory;
mod sled_store;

pub use memory::*;
pub use sled_store::*;


use std::path::Path;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::debug;
use tracing::warn;

use crate::BillingRecord;
use crate::RecordDraft;
use crate::RecordKeys;
use crate::Result;
use crate::StatusPatch;
use crate::UpsertOutcome;

/// Persistence seam for billing records.
///
/// `upsert` and `patch` are atomic: two identical deliveries racing through
/// `upsert` leave exactly one record behind, holding the later arrival's
/// draft. Lookup by subscription id wins over lookup by customer id; when
/// only a customer id is given and several records share it, the most
/// recently updated one wins.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BillingStore: Send + Sync + 'static {
    async fn find(
        &self,
        keys: &RecordKeys,
    ) -> Result<Option<BillingRecord>>;

    /// Creates or fully overwrites the record addressed by `keys`.
    ///
    /// A customer-addressed record that has no subscription id yet adopts
    /// the one `keys` carries. A record already bound to a different
    /// subscription id is left in place and a fresh record is created, so a
    /// replacement subscription never erases the old one's history.
    async fn upsert(
        &self,
        keys: &RecordKeys,
        draft: &RecordDraft,
    ) -> Result<UpsertOutcome>;

    /// Applies a narrow status patch to an existing record. Returns `None`
    /// without writing when nothing matches.
    async fn patch(
        &self,
        keys: &RecordKeys,
        patch: &StatusPatch,
    ) -> Result<Option<BillingRecord>>;

    /// Current record for a workspace; the most recently updated one when
    /// several exist.
    async fn workspace_record(
        &self,
        workspace_id: &str,
    ) -> Result<Option<BillingRecord>>;
}

/// Opens the embedded billing database under the given directory.
pub fn init_sled_billing_db(
    path: impl AsRef<Path> + std::fmt::Debug
) -> std::result::Result<sled::Db, std::io::Error> {
    debug!("init_sled_billing_db from path: {:?}", &path);

    sled::Config::default()
        .path(path.as_ref())
        .cache_capacity(10 * 1024 * 1024) //10MB
        .flush_every_ms(Some(3))
        .use_compression(true)
        .compression_factor(1)
        .open()
        .map_err(|e| {
            warn!("Try to open DB at this location: {:?} and failed: {:?}", path, e);
            std::io::Error::other(e)
        })
}
