//! Replicated binding codec.
//!
//! A binding is one [`Grouped`] encoded as a compact JSON string. The
//! replicated multimap stores a set of bindings per key; a key may briefly
//! hold several (e.g. across reconnects) until the replica garbage-collects
//! the old ones.

use crate::error::{RelationError, RelationResult};
use crate::grouped::Grouped;
use crate::relation::GroupedRelation;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

/// Encode one binding for the replicated multimap.
pub fn encode_binding<V: Ord + Serialize>(grouped: &Grouped<V>) -> RelationResult<String> {
    Ok(serde_json::to_string(grouped)?)
}

/// Decode one binding string.
pub fn decode_binding<V, F, E>(binding: &str, decoder: F) -> RelationResult<Grouped<V>>
where
    V: Ord,
    F: Fn(&Value) -> Result<V, E>,
    E: Display,
{
    let json: Value = serde_json::from_str(binding)
        .map_err(|e| RelationError::malformed(binding, e.to_string()))?;
    Grouped::from_json(&json, decoder).map_err(|e| match e {
        RelationError::MalformedBinding { message, .. } => RelationError::malformed(binding, message),
        other => other,
    })
}

/// Decode every binding of every key, one result per binding.
///
/// A malformed binding only fails its own entry; the other bindings of the
/// same key and of every other key still decode.
pub fn deserialize_replicated_bindings<K, V, F, E>(
    bindings: &BTreeMap<K, BTreeSet<String>>,
    decoder: F,
) -> BTreeMap<K, Vec<RelationResult<Grouped<V>>>>
where
    K: Ord + Clone,
    V: Ord,
    F: Fn(&Value) -> Result<V, E>,
    E: Display,
{
    bindings
        .iter()
        .map(|(key, strings)| {
            let decoded = strings
                .iter()
                .map(|binding| decode_binding(binding, &decoder))
                .collect();
            (key.clone(), decoded)
        })
        .collect()
}

/// Decode every binding of every key; the first malformed binding fails the
/// whole read.
pub fn deserialize_replicated_bindings_strict<K, V, F, E>(
    bindings: &BTreeMap<K, BTreeSet<String>>,
    decoder: F,
) -> RelationResult<BTreeMap<K, Vec<Grouped<V>>>>
where
    K: Ord + Clone,
    V: Ord,
    F: Fn(&Value) -> Result<V, E>,
    E: Display,
{
    deserialize_replicated_bindings(bindings, decoder)
        .into_iter()
        .map(|(key, results)| {
            let decoded = results.into_iter().collect::<RelationResult<Vec<_>>>()?;
            Ok((key, decoded))
        })
        .collect()
}

/// Decode every binding of every key, skipping malformed ones.
///
/// Skipped bindings are logged and returned alongside the decoded map so the
/// caller can decide whether the read is still usable.
pub fn deserialize_replicated_bindings_lenient<K, V, F, E>(
    bindings: &BTreeMap<K, BTreeSet<String>>,
    decoder: F,
) -> (BTreeMap<K, Vec<Grouped<V>>>, Vec<RelationError>)
where
    K: Ord + Clone,
    V: Ord,
    F: Fn(&Value) -> Result<V, E>,
    E: Display,
{
    let mut decoded = BTreeMap::new();
    let mut skipped = Vec::new();

    for (key, results) in deserialize_replicated_bindings(bindings, decoder) {
        let mut grouped = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(g) => grouped.push(g),
                Err(e) => {
                    tracing::warn!(error = %e, code = e.code(), "Skipping malformed binding");
                    skipped.push(e);
                }
            }
        }
        decoded.insert(key, grouped);
    }

    (decoded, skipped)
}

/// Rebuild a relation from decoded bindings.
pub fn relation_from_bindings<K, V>(
    bindings: BTreeMap<K, Vec<Grouped<V>>>,
) -> RelationResult<GroupedRelation<K, V>>
where
    K: Ord + Clone,
    V: Ord + Clone,
{
    let mut relation = GroupedRelation::new();
    for (key, groupeds) in bindings {
        for grouped in groupeds {
            let (group, values) = grouped.into_parts();
            relation.put(key.clone(), group, values)?;
        }
    }
    Ok(relation)
}
