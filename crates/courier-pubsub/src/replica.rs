//! Replicated multimap capability.
//!
//! Bindings are replicated through a conflict-free multimap of
//! `key -> set<binding string>`. The subscription layer only needs to read the
//! local merge and to add or remove single bindings; replica merge, garbage
//! collection and transport belong to the implementation.
//!
//! [`InMemoryMultimap`] is a reference replica: an observed-remove set per
//! key, merged by union of adds and union of tombstones. Concurrent add and
//! remove of the same binding keeps the add, and nothing depends on wall
//! clocks.

use crate::error::Result;
use async_lock::RwLock;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

/// Access to the local replica of the binding multimap
#[async_trait]
pub trait ReplicatedMultimap<K>: Send + Sync
where
    K: Send + Sync,
{
    /// Current local merge, keys without live bindings omitted
    async fn read(&self) -> Result<BTreeMap<K, BTreeSet<String>>>;

    /// Add one binding for `key`
    async fn add_binding(&self, key: &K, binding: String) -> Result<()>;

    /// Remove one binding of `key`, if present
    async fn remove_binding(&self, key: &K, binding: &str) -> Result<()>;

    /// Remove every binding of `key`
    async fn remove_key(&self, key: &K) -> Result<()>;
}

#[derive(Debug, Clone)]
struct OrMultimapState<K> {
    /// Live and dead tags per binding per key
    entries: BTreeMap<K, BTreeMap<String, BTreeSet<Uuid>>>,
    /// Tags whose add has been observed and removed
    tombstones: BTreeSet<Uuid>,
}

impl<K: Ord + Clone> OrMultimapState<K> {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            tombstones: BTreeSet::new(),
        }
    }

    fn live(&self) -> BTreeMap<K, BTreeSet<String>> {
        let mut live = BTreeMap::new();
        for (key, bindings) in &self.entries {
            let alive: BTreeSet<String> = bindings
                .iter()
                .filter(|(_, tags)| tags.iter().any(|tag| !self.tombstones.contains(tag)))
                .map(|(binding, _)| binding.clone())
                .collect();
            if !alive.is_empty() {
                live.insert(key.clone(), alive);
            }
        }
        live
    }

    fn join(&mut self, other: &Self) {
        for (key, bindings) in &other.entries {
            let local = self.entries.entry(key.clone()).or_default();
            for (binding, tags) in bindings {
                local
                    .entry(binding.clone())
                    .or_default()
                    .extend(tags.iter().copied());
            }
        }
        self.tombstones.extend(other.tombstones.iter().copied());
    }
}

/// In-process replica of the binding multimap
#[derive(Clone)]
pub struct InMemoryMultimap<K> {
    state: Arc<RwLock<OrMultimapState<K>>>,
}

impl<K: Ord + Clone> InMemoryMultimap<K> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(OrMultimapState::new())),
        }
    }

    /// Join another replica's state into this one.
    ///
    /// Commutative, associative and idempotent.
    pub async fn merge(&self, other: &Self) {
        if Arc::ptr_eq(&self.state, &other.state) {
            return;
        }
        let remote = other.state.read().await.clone();
        let mut state = self.state.write().await;
        state.join(&remote);
        tracing::trace!(
            keys = state.entries.len(),
            tombstones = state.tombstones.len(),
            "Merged replica state"
        );
    }

    /// Drop tags and keys that no longer contribute a live binding.
    ///
    /// Only safe once every replica has observed the tombstones, which the
    /// caller has to know.
    pub async fn compact(&self) {
        let mut state = self.state.write().await;
        let OrMultimapState {
            entries,
            tombstones,
        } = &mut *state;
        for bindings in entries.values_mut() {
            for tags in bindings.values_mut() {
                tags.retain(|tag| !tombstones.contains(tag));
            }
            bindings.retain(|_, tags| !tags.is_empty());
        }
        entries.retain(|_, bindings| !bindings.is_empty());
        tombstones.clear();
    }
}

impl<K: Ord + Clone> Default for InMemoryMultimap<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K> ReplicatedMultimap<K> for InMemoryMultimap<K>
where
    K: Ord + Clone + Send + Sync,
{
    async fn read(&self) -> Result<BTreeMap<K, BTreeSet<String>>> {
        Ok(self.state.read().await.live())
    }

    async fn add_binding(&self, key: &K, binding: String) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .entries
            .entry(key.clone())
            .or_default()
            .entry(binding)
            .or_default()
            .insert(Uuid::new_v4());
        Ok(())
    }

    async fn remove_binding(&self, key: &K, binding: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let observed: Vec<Uuid> = state
            .entries
            .get(key)
            .and_then(|bindings| bindings.get(binding))
            .map(|tags| tags.iter().copied().collect())
            .unwrap_or_default();
        state.tombstones.extend(observed);
        Ok(())
    }

    async fn remove_key(&self, key: &K) -> Result<()> {
        let mut state = self.state.write().await;
        let observed: Vec<Uuid> = state
            .entries
            .get(key)
            .map(|bindings| bindings.values().flatten().copied().collect())
            .unwrap_or_default();
        state.tombstones.extend(observed);
        Ok(())
    }
}
