//! Push-based change feed boundary.
//!
//! The remote store reports row-level changes over entity-scoped push
//! channels. This module defines the typed shapes crossing that boundary and
//! the [`ChangeFeed`] contract the router connects through. Delivery is not
//! guaranteed while a channel is down; consumers reconcile missed events with
//! a catch-up invalidation sweep after reconnecting.

mod local;
mod schema;
pub use local::*;
pub use schema::*;


use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::Result;

/// Row-level operation reported by the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// One change notification. Carries only the row's identifying fields, never
/// the full row, so consumers must re-fetch rather than patch cached values.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub entity: EntityKind,
    pub operation: ChangeOperation,
    pub row: RowFields,
}

/// Scope of one push channel: an entity plus an optional server-side filter.
/// Subscriptions with an equal spec share a single channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelSpec {
    pub entity: EntityKind,
    pub filter: Option<FilterExpression>,
}

impl std::fmt::Display for ChannelSpec {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match &self.filter {
            Some(filter) => write!(f, "{}[{}]", self.entity, filter),
            None => write!(f, "{}", self.entity),
        }
    }
}

/// Connection surface of the remote change feed.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChangeFeed: Send + Sync + 'static {
    /// Opens one push channel scoped to `spec`. Events arrive on the
    /// returned receiver until the channel drops; a closed receiver means
    /// the connection is gone and events may have been lost.
    async fn open(
        &self,
        spec: &ChannelSpec,
    ) -> Result<mpsc::Receiver<ChangeEvent>>;
}
