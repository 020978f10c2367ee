//! Acknowledgement label declarations.
//!
//! Subscribers declare the acknowledgement labels they will answer for.
//! A label has a single owner: either one ungrouped subscriber, or one group
//! whose members all declare the same label set. Declarations that would
//! break that are refused instead of silently overwriting the owner.

use crate::error::{PubSubError, Result};
use courier_relation::{encode_binding, GroupedRelation, RelationSnapshot};
use std::collections::BTreeSet;
use std::fmt::Debug;

/// Declared acknowledgement labels of one node's subscribers
#[derive(Debug, Clone)]
pub struct AckLabelRegistry<K> {
    relation: GroupedRelation<K, String>,
}

impl<K: Ord + Clone + Debug> AckLabelRegistry<K> {
    pub fn new() -> Self {
        Self {
            relation: GroupedRelation::new(),
        }
    }

    /// Declare `labels` for `subscriber`, replacing its earlier declaration.
    ///
    /// On conflict the earlier declaration stays in place.
    pub fn declare(
        &mut self,
        subscriber: K,
        group: Option<String>,
        labels: impl IntoIterator<Item = String>,
    ) -> Result<()> {
        let previous = self.relation.remove_key(&subscriber);

        match self.relation.try_put(subscriber.clone(), group, labels) {
            Ok(()) => Ok(()),
            Err(source) => {
                if let Some(previous) = previous {
                    let (group, labels) = previous.into_parts();
                    self.relation.put(subscriber.clone(), group, labels)?;
                }
                tracing::warn!(subscriber = ?subscriber, error = %source, "Refused ack label declaration");
                Err(PubSubError::AckLabelConflict {
                    subscriber: format!("{subscriber:?}"),
                    source,
                })
            }
        }
    }

    /// Forget every label of `subscriber`.
    pub fn release(&mut self, subscriber: &K) -> bool {
        self.relation.remove_key(subscriber).is_some()
    }

    pub fn is_declared(&self, label: &str) -> bool {
        self.relation.contains_value(&label.to_owned())
    }

    /// Labels a member of `groups` may rely on, ungrouped labels included.
    pub fn declared_labels<I, S>(&self, groups: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.relation.export().get_values(groups)
    }

    pub fn snapshot(&self) -> RelationSnapshot<K, String> {
        self.relation.export()
    }

    /// One encoded binding per group, for group-level replication.
    pub fn group_bindings(&self) -> Result<Vec<String>> {
        self.relation
            .export_values_by_group()
            .iter()
            .map(|grouped| encode_binding(grouped).map_err(PubSubError::from))
            .collect()
    }
}

impl<K: Ord + Clone + Debug> Default for AckLabelRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}
