//! Subscription manager.
//!
//! One manager per node owns that node's subscribers. It is the single writer
//! for the node's local relation and binding bookkeeping, writes bindings into
//! the replicated multimap, and republishes an immutable snapshot of the
//! cluster-wide relation after every change.
//!
//! ```text
//! subscribe/unsubscribe ──> SubscriptionManager ──add/remove──> ReplicatedMultimap
//!                                  │                                   │
//!                                  │ refresh: read + decode + export   │
//!                                  ▼                                   │
//!                          PublishedView (Arc) <──────────────────────┘
//!                                  │
//!                                  ▼
//!                              Publisher ──deliver──> SignalSink
//! ```
//!
//! Writers are serialized by an async mutex; readers only clone the
//! published `Arc`, so publishing never waits on a subscription change.
//! Replication to other nodes is not awaited.
//!
//! Every change writes the replica first and only then touches the local
//! bookkeeping, so a failed replica call leaves the subscriber as it was.

use crate::config::PubSubConfig;
use crate::dispatch::{select_recipients, AcceptAll, Signal, SignalFilter, SignalSink};
use crate::error::{PubSubError, Result};
use crate::replica::ReplicatedMultimap;
use async_lock::Mutex;
use async_trait::async_trait;
use courier_relation::{
    decode_binding, deserialize_replicated_bindings_lenient, deserialize_replicated_bindings_strict,
    encode_binding, relation_from_bindings, string_decoder, Grouped, GroupedRelation,
    RelationSnapshot,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

/// Subscribe/unsubscribe contract offered to pub/sub facades
#[async_trait]
pub trait SubscriptionConsistencyProtocol<K: Send + Sync>: Send + Sync {
    /// Register `subscriber` for `topics` under `group` (empty for none).
    ///
    /// Returns whether the registration is consistent with the replicated
    /// state. Only a resubscription can be inconsistent.
    async fn subscribe(
        &self,
        topics: Vec<String>,
        subscriber: K,
        filter: Option<String>,
        group: &str,
        resubscribe: bool,
    ) -> Result<bool>;

    /// Remove `subscriber` from `topics`.
    async fn unsubscribe(&self, topics: Vec<String>, subscriber: K) -> Result<()>;
}

/// Read side shared between the manager and its publishers
struct PublishedView<K> {
    snapshot: Arc<RelationSnapshot<K, String>>,
    filters: Arc<BTreeMap<K, String>>,
}

type SharedView<K> = Arc<RwLock<Arc<PublishedView<K>>>>;

/// Owner-local bookkeeping, only touched under the manager's mutex
struct LocalState<K> {
    relation: GroupedRelation<K, String>,
    bindings: BTreeMap<K, String>,
    filters: BTreeMap<K, String>,
}

/// Single writer for one node's subscriptions
pub struct SubscriptionManager<K, M> {
    config: PubSubConfig,
    replica: M,
    local: Mutex<LocalState<K>>,
    published: SharedView<K>,
}

impl<K, M> SubscriptionManager<K, M>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    M: ReplicatedMultimap<K>,
{
    pub fn new(config: PubSubConfig, replica: M) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            replica,
            local: Mutex::new(LocalState {
                relation: GroupedRelation::new(),
                bindings: BTreeMap::new(),
                filters: BTreeMap::new(),
            }),
            published: Arc::new(RwLock::new(Arc::new(PublishedView {
                snapshot: Arc::new(RelationSnapshot::empty()),
                filters: Arc::new(BTreeMap::new()),
            }))),
        })
    }

    pub fn config(&self) -> &PubSubConfig {
        &self.config
    }

    pub fn replica(&self) -> &M {
        &self.replica
    }

    /// Latest published cluster-wide snapshot
    pub fn snapshot(&self) -> Arc<RelationSnapshot<K, String>> {
        self.published.read().snapshot.clone()
    }

    /// Topics and group currently held by a local subscriber
    pub async fn local_subscription(&self, subscriber: &K) -> Option<Grouped<String>> {
        self.local.lock().await.relation.get(subscriber).cloned()
    }

    /// Publisher that delivers through `sink`, accepting every filter
    pub fn publisher<T>(&self, sink: Arc<dyn SignalSink<K, T>>) -> Publisher<K, T> {
        self.publisher_with_filter(sink, Arc::new(AcceptAll))
    }

    /// Publisher that evaluates subscriber filters with `filter`
    pub fn publisher_with_filter<T>(
        &self,
        sink: Arc<dyn SignalSink<K, T>>,
        filter: Arc<dyn SignalFilter<T>>,
    ) -> Publisher<K, T> {
        Publisher {
            view: self.published.clone(),
            sink,
            filter,
            _signal: PhantomData,
        }
    }

    /// Rebuild the snapshot from the replica's current local merge.
    ///
    /// Called after every local change and by the embedding whenever a
    /// replication update arrives.
    pub async fn refresh(&self) -> Result<()> {
        let local = self.local.lock().await;
        self.refresh_locked(&local).await
    }

    /// Drop every topic of `subscriber`, e.g. when it terminates.
    pub async fn remove_subscriber(&self, subscriber: &K) -> Result<()> {
        let mut local = self.local.lock().await;
        if !local.relation.contains_key(subscriber) {
            return Ok(());
        }
        self.replica.remove_key(subscriber).await?;
        local.relation.remove_key(subscriber);
        local.bindings.remove(subscriber);
        local.filters.remove(subscriber);
        tracing::debug!(subscriber = ?subscriber, "Removed subscriber");
        self.refresh_locked(&local).await
    }

    async fn refresh_locked(&self, local: &LocalState<K>) -> Result<()> {
        let bindings = self.replica.read().await?;
        let decoded = if self.config.skip_malformed_bindings {
            deserialize_replicated_bindings_lenient(&bindings, string_decoder).0
        } else {
            deserialize_replicated_bindings_strict(&bindings, string_decoder)?
        };
        let snapshot = relation_from_bindings(decoded)?.export();

        tracing::trace!(
            values = snapshot.keys_by_value().len(),
            estimated_size = snapshot.estimate_size(),
            "Published relation snapshot"
        );

        *self.published.write() = Arc::new(PublishedView {
            snapshot: Arc::new(snapshot),
            filters: Arc::new(local.filters.clone()),
        });
        Ok(())
    }

    /// Whether a resubscription of `subscriber` to `requested`, ending up
    /// bound to `grouped`, matches the replicated state read before the write.
    ///
    /// The subscriber must already have held every requested topic under the
    /// same group, and no other holder of a named group may be bound to a
    /// different topic set (a split group).
    fn resubscription_consistent(
        before: &BTreeMap<K, BTreeSet<String>>,
        subscriber: &K,
        grouped: &Grouped<String>,
        requested: &BTreeSet<String>,
    ) -> bool {
        let already_bound = before.get(subscriber).is_some_and(|strings| {
            strings
                .iter()
                .filter_map(|binding| decode_logged(binding))
                .any(|held| held.group() == grouped.group() && requested.is_subset(held.values()))
        });
        if !already_bound {
            return false;
        }

        let Some(group) = grouped.group() else {
            return true;
        };
        let split = before
            .iter()
            .filter(|(key, _)| *key != subscriber)
            .flat_map(|(key, strings)| strings.iter().map(move |binding| (key, binding)))
            .filter_map(|(key, binding)| decode_logged(binding).map(|held| (key, held)))
            .find(|(_, held)| held.group() == Some(group) && held.values() != grouped.values());
        match split {
            Some((holder, _)) => {
                tracing::warn!(
                    subscriber = ?subscriber,
                    holder = ?holder,
                    group,
                    "Group is held with a different topic set"
                );
                false
            }
            None => true,
        }
    }

    /// Publish `grouped` as the subscriber's binding, replacing `previous`.
    ///
    /// The new binding is added before the previous one is removed, so a
    /// failure never leaves the subscriber without a binding.
    async fn write_binding(
        &self,
        subscriber: &K,
        previous: Option<&str>,
        grouped: &Grouped<String>,
    ) -> Result<String> {
        let binding = encode_binding(grouped)?;
        if binding.len() > self.config.max_binding_bytes {
            return Err(PubSubError::BindingTooLarge {
                size: binding.len(),
                limit: self.config.max_binding_bytes,
            });
        }
        self.replica
            .add_binding(subscriber, binding.clone())
            .await?;
        if let Some(previous) = previous.filter(|previous| *previous != binding) {
            self.replica.remove_binding(subscriber, previous).await?;
        }
        Ok(binding)
    }
}

/// Decode a replicated binding, logging it when malformed.
fn decode_logged(binding: &str) -> Option<Grouped<String>> {
    match decode_binding(binding, string_decoder) {
        Ok(grouped) => Some(grouped),
        Err(e) => {
            tracing::warn!(error = %e, code = e.code(), "Ignoring malformed binding");
            None
        }
    }
}

#[async_trait]
impl<K, M> SubscriptionConsistencyProtocol<K> for SubscriptionManager<K, M>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    M: ReplicatedMultimap<K>,
{
    async fn subscribe(
        &self,
        topics: Vec<String>,
        subscriber: K,
        filter: Option<String>,
        group: &str,
        resubscribe: bool,
    ) -> Result<bool> {
        let group = (!group.is_empty()).then(|| group.to_owned());
        let topics: BTreeSet<String> = topics.into_iter().collect();
        let mut local = self.local.lock().await;

        let before = if resubscribe {
            Some(self.replica.read().await?)
        } else {
            None
        };

        let mut all_topics = local
            .relation
            .get(&subscriber)
            .map(|current| current.values().clone())
            .unwrap_or_default();
        all_topics.extend(topics.iter().cloned());
        if all_topics.len() > self.config.max_topics_per_subscriber {
            return Err(PubSubError::TooManyTopics {
                count: all_topics.len(),
                limit: self.config.max_topics_per_subscriber,
            });
        }

        let grouped = Grouped::with_group(group.clone(), all_topics.iter().cloned());
        let previous = local.bindings.get(&subscriber).cloned();
        let binding = self
            .write_binding(&subscriber, previous.as_deref(), &grouped)
            .await?;

        let consistent = before.as_ref().map_or(true, |before| {
            Self::resubscription_consistent(before, &subscriber, &grouped, &topics)
        });

        local.bindings.insert(subscriber.clone(), binding);
        local.relation.remove_key(&subscriber);
        local.relation.put(subscriber.clone(), group, all_topics)?;
        match filter {
            Some(filter) => local.filters.insert(subscriber.clone(), filter),
            None => local.filters.remove(&subscriber),
        };

        tracing::debug!(
            subscriber = ?subscriber,
            group = ?grouped.group(),
            topics = grouped.values().len(),
            resubscribe,
            "Subscribed"
        );
        if !consistent {
            tracing::warn!(
                subscriber = ?subscriber,
                group = ?grouped.group(),
                "Resubscription does not match replicated state"
            );
        }

        self.refresh_locked(&local).await?;
        Ok(consistent)
    }

    async fn unsubscribe(&self, topics: Vec<String>, subscriber: K) -> Result<()> {
        let mut local = self.local.lock().await;
        let Some(current) = local.relation.get(&subscriber).cloned() else {
            return Ok(());
        };
        let (group, mut remaining) = current.into_parts();
        for topic in &topics {
            remaining.remove(topic);
        }

        if remaining.is_empty() {
            self.replica.remove_key(&subscriber).await?;
            local.relation.remove_key(&subscriber);
            local.bindings.remove(&subscriber);
            local.filters.remove(&subscriber);
        } else {
            let grouped = Grouped::with_group(group.clone(), remaining.iter().cloned());
            let previous = local.bindings.get(&subscriber).cloned();
            let binding = self
                .write_binding(&subscriber, previous.as_deref(), &grouped)
                .await?;
            local.bindings.insert(subscriber.clone(), binding);
            local.relation.remove_key(&subscriber);
            local.relation.put(subscriber.clone(), group, remaining)?;
        }

        tracing::debug!(subscriber = ?subscriber, topics = topics.len(), "Unsubscribed");
        self.refresh_locked(&local).await
    }
}

/// Fire-and-forget publishing against the latest snapshot
pub struct Publisher<K, T> {
    view: SharedView<K>,
    sink: Arc<dyn SignalSink<K, T>>,
    filter: Arc<dyn SignalFilter<T>>,
    _signal: PhantomData<fn(T)>,
}

impl<K, T> Publisher<K, T>
where
    K: Ord + Clone + Debug,
    T: Signal + Clone,
{
    /// Deliver `signal` to its recipients.
    ///
    /// Ungrouped subscribers of any of the signal's topics all receive it;
    /// each group receives it once, at the member picked by
    /// `group_index_key`. Returns the number of deliveries.
    pub fn publish(&self, signal: &T, group_index_key: &str, sender: Option<&K>) -> usize {
        let view = self.view.read().clone();
        let topics = signal.topics();
        let recipients = select_recipients(&view.snapshot, &topics, group_index_key);

        let mut delivered = 0;
        for recipient in &recipients {
            if let Some(filter) = view.filters.get(recipient) {
                if !self.filter.accepts(filter, signal) {
                    continue;
                }
            }
            self.sink.deliver(recipient, signal.clone(), sender);
            delivered += 1;
        }

        if delivered == 0 {
            tracing::trace!(topics = ?topics, group_index_key, "Signal has no recipients");
        }
        delivered
    }

    /// Snapshot the next `publish` will resolve against
    pub fn snapshot(&self) -> Arc<RelationSnapshot<K, String>> {
        self.view.read().snapshot.clone()
    }
}

impl<K, T> Clone for Publisher<K, T> {
    fn clone(&self) -> Self {
        Self {
            view: self.view.clone(),
            sink: self.sink.clone(),
            filter: self.filter.clone(),
            _signal: PhantomData,
        }
    }
}
