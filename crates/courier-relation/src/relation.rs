//! Grouped key/value relation.
//!
//! Three indices are kept in step:
//!
//! - `by_key`: key -> grouped set of values
//! - `by_value`: value -> grouped set of keys
//! - `by_group`: group name -> values of that group
//!
//! The relation is a disjoint union of complete bipartite components, one per
//! named group, plus any number of ungrouped keys:
//!
//! 1. a key belongs to at most one group;
//! 2. a value belongs to at most one group;
//! 3. every key of a named group maps to the same value set;
//! 4. keys of different groups map to disjoint value sets;
//! 5. ungrouped keys are unconstrained.
//!
//! [`GroupedRelation::put`] is the low-level primitive and does not check 3
//! and 4; that is caller discipline. [`GroupedRelation::try_put`] checks them.
//!
//! The relation is not synchronized. It is meant to be owned by one task per
//! node which serializes every mutation and hands out
//! [`RelationSnapshot`]s to readers.

use crate::error::{RelationError, RelationResult};
use crate::grouped::Grouped;
use crate::snapshot::{RelationSnapshot, UNGROUPED};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

/// Mutable, node-local subscription index
#[derive(Debug, Clone)]
pub struct GroupedRelation<K, V> {
    by_key: BTreeMap<K, Grouped<V>>,
    by_value: BTreeMap<V, Grouped<K>>,
    by_group: BTreeMap<String, BTreeSet<V>>,
}

impl<K: Ord + Clone, V: Ord + Clone> GroupedRelation<K, V> {
    pub fn new() -> Self {
        Self {
            by_key: BTreeMap::new(),
            by_value: BTreeMap::new(),
            by_group: BTreeMap::new(),
        }
    }

    /// Associate `key` with `values` and no group.
    pub fn put_ungrouped(
        &mut self,
        key: K,
        values: impl IntoIterator<Item = V>,
    ) -> RelationResult<()> {
        self.put(key, None, values)
    }

    /// Associate `key` with `values` under `group`.
    ///
    /// The previous entry of `key` is replaced, but its old values keep
    /// pointing at `key` in the value index; call [`remove_key`] first for
    /// replace semantics. A value keeps the group it was first inserted
    /// with. A named group's value set is overwritten, not merged.
    ///
    /// [`remove_key`]: Self::remove_key
    pub fn put(
        &mut self,
        key: K,
        group: Option<String>,
        values: impl IntoIterator<Item = V>,
    ) -> RelationResult<()> {
        validate_group(group.as_deref())?;
        let values: BTreeSet<V> = values.into_iter().collect();

        for value in &values {
            match self.by_value.entry(value.clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(Grouped::with_group(group.clone(), [key.clone()]));
                }
                Entry::Occupied(mut entry) => entry.get_mut().insert(key.clone()),
            }
        }

        if let Some(group) = &group {
            self.by_group.insert(group.clone(), values.clone());
        }
        self.by_key.insert(key, Grouped::with_group(group, values));
        Ok(())
    }

    /// Like [`put`](Self::put), but refuses inserts that would break the
    /// one-group-per-value rule or give a named group a second value set.
    ///
    /// Nothing is modified when an error is returned.
    pub fn try_put(
        &mut self,
        key: K,
        group: Option<String>,
        values: impl IntoIterator<Item = V>,
    ) -> RelationResult<()>
    where
        V: Debug,
    {
        validate_group(group.as_deref())?;
        let values: BTreeSet<V> = values.into_iter().collect();

        for value in &values {
            if let Some(keys) = self.by_value.get(value) {
                if keys.group() != group.as_deref() {
                    return Err(RelationError::GroupConflict {
                        value: format!("{value:?}"),
                        existing: keys.group().map(str::to_owned),
                        requested: group,
                    });
                }
            }
        }

        if let Some(name) = group.as_deref() {
            if let Some(existing) = self.by_group.get(name) {
                if *existing != values {
                    return Err(RelationError::GroupMismatch {
                        group: name.to_owned(),
                    });
                }
            }
        }

        self.put(key, group, values)
    }

    /// Current value set of a named group
    pub fn get_values_of_group(&self, group: &str) -> Option<&BTreeSet<V>> {
        self.by_group.get(group)
    }

    pub fn get(&self, key: &K) -> Option<&Grouped<V>> {
        self.by_key.get(key)
    }

    /// Drop `key` and unlink it from each of its values.
    ///
    /// Values left without keys disappear. A named group's bucket is only
    /// deleted once no remaining key belongs to that group.
    pub fn remove_key(&mut self, key: &K) -> Option<Grouped<V>> {
        let removed = self.by_key.remove(key)?;

        for value in removed.values() {
            let now_empty = match self.by_value.get_mut(value) {
                Some(keys) => {
                    keys.remove(key);
                    keys.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.by_value.remove(value);
            }
        }

        if let Some(group) = removed.group() {
            let still_used = self.by_key.values().any(|other| other.group() == Some(group));
            if !still_used {
                self.by_group.remove(group);
            }
        }

        Some(removed)
    }

    pub fn contains_value(&self, value: &V) -> bool {
        self.by_value.contains_key(value)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.by_key.contains_key(key)
    }

    /// Every key with its grouped value set
    pub fn entries(&self) -> impl Iterator<Item = (&K, &Grouped<V>)> {
        self.by_key.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.by_key.keys()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// One grouped set per group, unioning the values of all its keys.
    ///
    /// All ungrouped keys collapse into a single ungrouped entry.
    pub fn export_values_by_group(&self) -> Vec<Grouped<V>> {
        let mut merged: BTreeMap<&str, Grouped<V>> = BTreeMap::new();
        for grouped in self.by_key.values() {
            let name = grouped.group().unwrap_or(UNGROUPED);
            merged
                .entry(name)
                .or_insert_with(|| {
                    Grouped::with_group(grouped.group().map(str::to_owned), BTreeSet::new())
                })
                .extend(grouped.values().iter().cloned());
        }
        merged.into_values().collect()
    }

    /// Copy the relation into an immutable snapshot.
    pub fn export(&self) -> RelationSnapshot<K, V> {
        let mut keys_by_value = BTreeMap::new();
        let mut group_by_value = BTreeMap::new();
        let mut ungrouped = BTreeSet::new();

        for (value, keys) in &self.by_value {
            keys_by_value.insert(value.clone(), keys.values().clone());
            match keys.group() {
                Some(group) => {
                    group_by_value.insert(value.clone(), group.to_owned());
                }
                None => {
                    group_by_value.insert(value.clone(), UNGROUPED.to_owned());
                    ungrouped.insert(value.clone());
                }
            }
        }

        let mut values_by_group = self.by_group.clone();
        values_by_group.insert(UNGROUPED.to_owned(), ungrouped);

        let group_by_key = self
            .by_key
            .iter()
            .map(|(key, grouped)| {
                (key.clone(), grouped.group().unwrap_or(UNGROUPED).to_owned())
            })
            .collect();

        RelationSnapshot::new(keys_by_value, values_by_group, group_by_value, group_by_key)
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
        self.by_value.clear();
        self.by_group.clear();
    }
}

impl<K: Ord + Clone, V: Ord + Clone> Default for GroupedRelation<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_group(group: Option<&str>) -> RelationResult<()> {
    match group {
        Some(UNGROUPED) => Err(RelationError::invalid_argument(
            "group name must not be empty; use no group instead",
        )),
        _ => Ok(()),
    }
}
