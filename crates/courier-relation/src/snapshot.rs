//! Immutable read view of a [`GroupedRelation`](crate::GroupedRelation).
//!
//! The dispatch path resolves recipients against a snapshot instead of the
//! live relation, so a snapshot can be shared across tasks once published.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

/// Bucket name for values that belong to no group
pub const UNGROUPED: &str = "";

/// Point-in-time export of a relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationSnapshot<K, V> {
    keys_by_value: BTreeMap<V, BTreeSet<K>>,
    values_by_group: BTreeMap<String, BTreeSet<V>>,
    group_by_value: BTreeMap<V, String>,
    group_by_key: BTreeMap<K, String>,
}

impl<K: Ord + Clone, V: Ord + Clone> RelationSnapshot<K, V> {
    pub(crate) fn new(
        keys_by_value: BTreeMap<V, BTreeSet<K>>,
        values_by_group: BTreeMap<String, BTreeSet<V>>,
        group_by_value: BTreeMap<V, String>,
        group_by_key: BTreeMap<K, String>,
    ) -> Self {
        Self {
            keys_by_value,
            values_by_group,
            group_by_value,
            group_by_key,
        }
    }

    /// Snapshot with no keys and no values
    pub fn empty() -> Self {
        Self::new(BTreeMap::new(), BTreeMap::new(), BTreeMap::new(), BTreeMap::new())
    }

    /// Keys associated with `value`; empty when the value is unknown.
    pub fn get_keys(&self, value: &V) -> BTreeSet<K> {
        self.keys_by_value.get(value).cloned().unwrap_or_default()
    }

    /// Values visible to a subscriber belonging to `groups`.
    ///
    /// The ungrouped bucket is always included. Unknown group names add
    /// nothing.
    pub fn get_values<I, S>(&self, groups: I) -> BTreeSet<V>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut values = self
            .values_by_group
            .get(UNGROUPED)
            .cloned()
            .unwrap_or_default();
        for group in groups {
            if let Some(bucket) = self.values_by_group.get(group.as_ref()) {
                values.extend(bucket.iter().cloned());
            }
        }
        values
    }

    /// Group recorded for `value`, [`UNGROUPED`] when it has none.
    pub fn group_of(&self, value: &V) -> Option<&str> {
        self.group_by_value.get(value).map(String::as_str)
    }

    /// Group `key` subscribed under, [`UNGROUPED`] when it has none.
    ///
    /// Unlike [`group_of`](Self::group_of) this is the key's own group, so it
    /// stays exact when grouped and ungrouped keys share a value.
    pub fn group_of_key(&self, key: &K) -> Option<&str> {
        self.group_by_key.get(key).map(String::as_str)
    }

    pub fn contains_value(&self, value: &V) -> bool {
        self.keys_by_value.contains_key(value)
    }

    pub fn keys_by_value(&self) -> &BTreeMap<V, BTreeSet<K>> {
        &self.keys_by_value
    }

    pub fn values_by_group(&self) -> &BTreeMap<String, BTreeSet<V>> {
        &self.values_by_group
    }

    pub fn is_empty(&self) -> bool {
        self.keys_by_value.is_empty()
    }
}

impl<K, V: Display> RelationSnapshot<K, V> {
    /// Rough size of the group index in characters.
    ///
    /// Only a cost heuristic for replication flow control.
    pub fn estimate_size(&self) -> usize {
        self.values_by_group
            .iter()
            .map(|(group, values)| {
                group.len() + values.iter().map(|v| v.to_string().len()).sum::<usize>()
            })
            .sum()
    }
}

impl<K: Ord + Clone, V: Ord + Clone> Default for RelationSnapshot<K, V> {
    fn default() -> Self {
        Self::empty()
    }
}
