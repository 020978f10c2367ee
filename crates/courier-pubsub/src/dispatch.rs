//! Signal dispatch.
//!
//! Resolves the recipients of a signal against a published snapshot: every
//! ungrouped subscriber of any of its topics, and exactly one member of each
//! group subscribed to any of them. Each subscriber is classified by its own
//! group, so a topic shared by ungrouped subscribers and several groups
//! reaches all of them. The group member is chosen by hashing the signal's
//! group index key, so every node that publishes the same signal picks the
//! same member while the group's membership is the same.

use courier_relation::{RelationSnapshot, UNGROUPED};
use std::collections::{BTreeMap, BTreeSet};

/// Something that can be published to topic subscribers
pub trait Signal {
    /// Topics this signal is addressed to
    fn topics(&self) -> Vec<String>;
}

/// Delivery of a resolved signal to one subscriber
pub trait SignalSink<K, T>: Send + Sync {
    fn deliver(&self, recipient: &K, signal: T, sender: Option<&K>);
}

/// Evaluation of a subscriber's filter expression against a signal
pub trait SignalFilter<T>: Send + Sync {
    fn accepts(&self, filter: &str, signal: &T) -> bool;
}

/// Filter that lets every signal through
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl<T> SignalFilter<T> for AcceptAll {
    fn accepts(&self, _filter: &str, _signal: &T) -> bool {
        true
    }
}

/// Recipients of a signal with the given topics.
pub fn select_recipients<K>(
    snapshot: &RelationSnapshot<K, String>,
    topics: &[String],
    group_index_key: &str,
) -> BTreeSet<K>
where
    K: Ord + Clone,
{
    let mut recipients = BTreeSet::new();
    let mut members_by_group: BTreeMap<&str, BTreeSet<K>> = BTreeMap::new();

    for topic in topics {
        for key in snapshot.get_keys(topic) {
            match snapshot.group_of_key(&key) {
                None | Some(UNGROUPED) => {
                    recipients.insert(key);
                }
                Some(group) => {
                    members_by_group.entry(group).or_default().insert(key);
                }
            }
        }
    }

    for members in members_by_group.into_values() {
        let chosen = member_index(group_index_key, members.len());
        if let Some(member) = members.into_iter().nth(chosen) {
            recipients.insert(member);
        }
    }

    recipients
}

/// Stable index in `0..len` derived from the group index key.
fn member_index(group_index_key: &str, len: usize) -> usize {
    let digest = blake3::hash(group_index_key.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    (u64::from_le_bytes(prefix) % len as u64) as usize
}
