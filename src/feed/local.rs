use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::mpsc;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::debug;
use tracing::warn;

use super::decode_row;
use super::ChangeEvent;
use super::ChangeFeed;
use super::ChangeOperation;
use super::ChannelSpec;
use super::EntityKind;
use crate::FeedConfig;
use crate::Result;

/// In-process [`ChangeFeed`] fanning published events out over per-entity
/// broadcast topics.
///
/// Mirrors the remote feed's delivery contract: a slow consumer can lose
/// events (broadcast lag), and [`LocalChangeFeed::disconnect`] drops a topic
/// so every open channel on it closes, the same way a network outage would.
pub struct LocalChangeFeed {
    channel_capacity: usize,
    topics: DashMap<EntityKind, broadcast::Sender<ChangeEvent>>,
}

impl LocalChangeFeed {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channel_capacity: channel_capacity.max(1),
            topics: DashMap::new(),
        }
    }

    pub fn from_config(config: &FeedConfig) -> Self {
        Self::new(config.channel_capacity)
    }

    fn topic(
        &self,
        entity: EntityKind,
    ) -> broadcast::Sender<ChangeEvent> {
        self.topics
            .entry(entity)
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .clone()
    }

    /// Publishes one typed event. Returns how many open channels carried it.
    pub fn publish(
        &self,
        event: ChangeEvent,
    ) -> usize {
        self.topic(event.entity).send(event).unwrap_or(0)
    }

    /// Decodes a wire row and publishes it. Rows that are not objects are
    /// rejected before reaching any channel.
    pub fn publish_raw(
        &self,
        entity: EntityKind,
        operation: ChangeOperation,
        payload: &Value,
    ) -> Result<usize> {
        let row = decode_row(entity, payload)?;
        Ok(self.publish(ChangeEvent {
            entity,
            operation,
            row,
        }))
    }

    /// Drops the entity's topic, closing every channel currently open on it.
    /// Consumers observe the closure and reconnect, which re-creates the
    /// topic on the next `open`.
    pub fn disconnect(
        &self,
        entity: EntityKind,
    ) {
        if self.topics.remove(&entity).is_some() {
            debug!("dropped feed topic for {}", entity);
        }
    }

    /// Number of channels currently open on the entity's topic
    pub fn receiver_count(
        &self,
        entity: EntityKind,
    ) -> usize {
        self.topics
            .get(&entity)
            .map(|topic| topic.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ChangeFeed for LocalChangeFeed {
    async fn open(
        &self,
        spec: &ChannelSpec,
    ) -> Result<mpsc::Receiver<ChangeEvent>> {
        let upstream = self.topic(spec.entity).subscribe();
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let filter = spec.filter.clone();
        let channel = spec.to_string();

        tokio::spawn(async move {
            let mut stream = BroadcastStream::new(upstream);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => {
                        if let Some(filter) = &filter {
                            if !filter.matches(&event.row) {
                                continue;
                            }
                        }
                        if tx.send(event).await.is_err() {
                            // consumer went away, stop forwarding
                            return;
                        }
                    }
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        // delivery while connected is best-effort; consumers
                        // that must not miss events reconcile via sweeps
                        warn!("channel {} lagged, {} events dropped", channel, missed);
                    }
                }
            }
            debug!("feed topic closed for channel {}", channel);
        });

        Ok(rx)
    }
}
