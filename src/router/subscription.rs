use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::InvalidationTarget;
use super::SweepAction;
use crate::utils::backoff::Backoff;
use crate::BackoffPolicy;
use crate::ChangeEvent;
use crate::ChangeFeed;
use crate::ChannelSpec;
use crate::EntityKind;
use crate::FilterExpression;
use crate::QueryCache;
use crate::Result;
use crate::RouterError;
use crate::CACHE_INVALIDATIONS;
use crate::CATCHUP_SWEEPS;
use crate::FEED_RECONNECTS;

/// Invalidation targets of every live subscription on one channel, keyed by
/// subscription id.
type TargetRegistry = DashMap<u64, Vec<InvalidationTarget>>;

/// Book-keeping for one shared feed channel.
struct ChannelShare {
    refs: usize,
    registry: Arc<TargetRegistry>,
    cancel: CancellationToken,
}

/// Routes change-feed events to cache invalidations.
///
/// Subscriptions with the same `(entity, filter)` share a single feed channel;
/// the channel is opened on the first subscription and closed when the last
/// one is released. Cheap to clone, all clones share state.
#[derive(Clone)]
pub struct SubscriptionRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    feed: Arc<dyn ChangeFeed>,
    cache: Arc<dyn QueryCache>,
    channels: DashMap<ChannelSpec, ChannelShare>,
    next_subscription_id: AtomicU64,
    connect_policy: BackoffPolicy,
    shutdown_signal: watch::Receiver<()>,
}

impl SubscriptionRouter {
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        cache: Arc<dyn QueryCache>,
        connect_policy: BackoffPolicy,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        SubscriptionRouter {
            inner: Arc::new(RouterInner {
                feed,
                cache,
                channels: DashMap::new(),
                next_subscription_id: AtomicU64::new(1),
                connect_policy,
                shutdown_signal,
            }),
        }
    }

    /// Registers a subscription and returns a handle that keeps it alive.
    ///
    /// `filter` is an optional `column = value` predicate narrowing the
    /// channel; `targets` are the cache-key patterns to invalidate whenever a
    /// matching change arrives. Inputs are validated against the entity
    /// schema before anything is registered.
    pub fn subscribe(
        &self,
        entity: &str,
        filter: Option<&str>,
        targets: &[&str],
    ) -> Result<SubscriptionHandle> {
        let entity = EntityKind::from_name(entity)?;
        let filter = match filter {
            Some(raw) => Some(FilterExpression::parse(entity, raw)?),
            None => None,
        };
        if targets.is_empty() {
            return Err(RouterError::EmptyTargets.into());
        }
        let targets = targets
            .iter()
            .map(|raw| InvalidationTarget::parse(entity, raw))
            .collect::<Result<Vec<_>>>()?;

        let spec = ChannelSpec { entity, filter };
        let subscription_id = self
            .inner
            .next_subscription_id
            .fetch_add(1, Ordering::SeqCst);

        match self.inner.channels.entry(spec.clone()) {
            Entry::Occupied(mut occupied) => {
                let share = occupied.get_mut();
                share.refs += 1;
                share.registry.insert(subscription_id, targets);
                debug!(
                    "subscription {} joined channel {} ({} refs)",
                    subscription_id, spec, share.refs
                );
            }
            Entry::Vacant(vacant) => {
                let registry: Arc<TargetRegistry> = Arc::new(DashMap::new());
                registry.insert(subscription_id, targets);
                let cancel = CancellationToken::new();
                tokio::spawn(run_channel_listener(
                    self.inner.clone(),
                    spec.clone(),
                    registry.clone(),
                    cancel.clone(),
                ));
                vacant.insert(ChannelShare {
                    refs: 1,
                    registry,
                    cancel,
                });
                debug!("subscription {} opened channel {}", subscription_id, spec);
            }
        }

        Ok(SubscriptionHandle {
            subscription_id,
            spec,
            inner: Some(self.inner.clone()),
        })
    }

    /// Number of distinct feed channels currently open.
    pub fn channel_count(&self) -> usize {
        self.inner.channels.len()
    }
}

impl RouterInner {
    fn release_subscription(
        &self,
        spec: &ChannelSpec,
        subscription_id: u64,
    ) {
        let mut drained = false;
        if let Some(mut share) = self.channels.get_mut(spec) {
            // The entry may belong to a successor channel for the same spec;
            // only subscriptions registered in it count against its refs.
            if share.registry.remove(&subscription_id).is_some() {
                share.refs = share.refs.saturating_sub(1);
                drained = share.refs == 0;
                debug!(
                    "subscription {} left channel {} ({} refs)",
                    subscription_id, spec, share.refs
                );
            }
        }
        if drained {
            self.channels.remove_if(spec, |_, share| {
                if share.refs == 0 {
                    share.cancel.cancel();
                    info!("closing channel {}", spec);
                    true
                } else {
                    false
                }
            });
        }
    }
}

/// Keeps one subscription registered while it is held.
///
/// Dropping the handle releases the subscription; [`release`](Self::release)
/// does the same with the intent spelled out. When the last handle on a
/// channel goes away the channel itself is torn down.
pub struct SubscriptionHandle {
    subscription_id: u64,
    spec: ChannelSpec,
    inner: Option<Arc<RouterInner>>,
}

impl SubscriptionHandle {
    pub fn subscription_id(&self) -> u64 {
        self.subscription_id
    }

    pub fn channel_spec(&self) -> &ChannelSpec {
        &self.spec
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release_subscription(&self.spec, self.subscription_id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release_inner();
    }
}

enum Connect {
    Channel(mpsc::Receiver<ChangeEvent>),
    Cancelled,
    Exhausted,
}

/// Owns one shared channel: connects, routes events, reconnects on loss.
async fn run_channel_listener(
    inner: Arc<RouterInner>,
    spec: ChannelSpec,
    registry: Arc<TargetRegistry>,
    cancel: CancellationToken,
) {
    let mut shutdown_signal = inner.shutdown_signal.clone();
    let mut backoff = Backoff::new(inner.connect_policy);
    let mut reconnecting = false;

    loop {
        let mut channel =
            match connect(&inner, &spec, &mut backoff, &cancel, &mut shutdown_signal).await {
                Connect::Channel(channel) => channel,
                Connect::Cancelled => return,
                Connect::Exhausted => {
                    error!("channel {} gave up reconnecting, dropping channel", spec);
                    // Guard on registry identity so a successor channel for
                    // the same spec is never torn down by accident.
                    inner
                        .channels
                        .remove_if(&spec, |_, share| Arc::ptr_eq(&share.registry, &registry));
                    return;
                }
            };

        if reconnecting {
            FEED_RECONNECTS
                .with_label_values(&[spec.entity.as_str()])
                .inc();
            catch_up_sweep(&inner, &spec, &registry);
        }
        reconnecting = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("channel {} released, stopping listener", spec);
                    return;
                }
                _ = shutdown_signal.changed() => {
                    warn!("channel {} listener received shutdown signal", spec);
                    return;
                }
                maybe_event = channel.recv() => match maybe_event {
                    Some(event) => handle_event(&inner, &spec, &registry, &event),
                    None => {
                        warn!("channel {} disconnected, reconnecting", spec);
                        break;
                    }
                }
            }
        }
    }
}

async fn connect(
    inner: &RouterInner,
    spec: &ChannelSpec,
    backoff: &mut Backoff,
    cancel: &CancellationToken,
    shutdown_signal: &mut watch::Receiver<()>,
) -> Connect {
    loop {
        if cancel.is_cancelled() {
            return Connect::Cancelled;
        }
        let attempt_timeout = backoff.attempt_timeout();
        match timeout(attempt_timeout, inner.feed.open(spec)).await {
            Ok(Ok(channel)) => {
                backoff.reset();
                return Connect::Channel(channel);
            }
            Ok(Err(e)) => {
                warn!("channel {} connect failed: {:?}", spec, e);
            }
            Err(_) => {
                warn!(
                    "channel {} connect timed out after {:?}",
                    spec, attempt_timeout
                );
            }
        }
        match backoff.next_delay() {
            Some(delay) => {
                tokio::select! {
                    _ = cancel.cancelled() => return Connect::Cancelled,
                    _ = shutdown_signal.changed() => return Connect::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => return Connect::Exhausted,
        }
    }
}

fn handle_event(
    inner: &RouterInner,
    spec: &ChannelSpec,
    registry: &TargetRegistry,
    event: &ChangeEvent,
) {
    // Channels are entity-scoped; a mismatched event cannot belong here.
    if event.entity != spec.entity {
        warn!(
            "channel {} received event for {}, ignoring",
            spec, event.entity
        );
        return;
    }
    if let Some(filter) = &spec.filter {
        if !filter.matches(&event.row) {
            return;
        }
    }

    for subscription in registry.iter() {
        for target in subscription.value() {
            match target.resolve(&event.row) {
                Some(key) => {
                    inner.cache.invalidate(&key);
                    CACHE_INVALIDATIONS
                        .with_label_values(&[key.namespace()])
                        .inc();
                }
                None => {
                    // The row cannot resolve the template; widen to the whole
                    // target rather than leave a possibly-stale key behind.
                    apply_sweep(inner, &target.sweep_action());
                }
            }
        }
    }
}

/// Invalidates every registered target once after a reconnect.
///
/// Changes published while the channel was down were never delivered, so all
/// dependent keys are suspect. Identical sweep actions registered by several
/// subscriptions collapse to a single application.
fn catch_up_sweep(
    inner: &RouterInner,
    spec: &ChannelSpec,
    registry: &TargetRegistry,
) {
    let mut applied: HashSet<SweepAction> = HashSet::new();
    for subscription in registry.iter() {
        for target in subscription.value() {
            let action = target.sweep_action();
            if applied.insert(action.clone()) {
                apply_sweep(inner, &action);
            }
        }
    }
    CATCHUP_SWEEPS
        .with_label_values(&[spec.entity.as_str()])
        .inc();
    info!(
        "channel {} reconnected, swept {} distinct targets",
        spec,
        applied.len()
    );
}

fn apply_sweep(
    inner: &RouterInner,
    action: &SweepAction,
) {
    match action {
        SweepAction::Exact(key) => {
            inner.cache.invalidate(key);
            CACHE_INVALIDATIONS
                .with_label_values(&[key.namespace()])
                .inc();
        }
        SweepAction::Prefix(prefix) => {
            let removed = inner.cache.invalidate_prefix(prefix);
            let namespace = prefix.split(':').next().unwrap_or_default();
            CACHE_INVALIDATIONS
                .with_label_values(&[namespace])
                .inc_by(removed as u64);
        }
    }
}
