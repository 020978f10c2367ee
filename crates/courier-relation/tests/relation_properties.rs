//! Relation Property Tests
//!
//! Property-based checks of the grouped relation invariants:
//!
//! 1. **Round-trip**: a grouped set survives its JSON encoding
//! 2. **Disjointness**: distinct groups never share a value
//! 3. **Bipartite groups**: every key of a group sees the group's value set
//! 4. **Export idempotence**: exporting twice yields equal snapshots

use courier_relation::{
    decode_binding, encode_binding, serde_decoder, string_decoder, Grouped, GroupedRelation,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

const GROUPS: [Option<&str>; 3] = [None, Some("alpha"), Some("beta")];

/// One relation step: remove the key, then re-insert it through the checked put
#[derive(Debug, Clone)]
struct Step {
    key: u8,
    group: Option<String>,
    values: BTreeSet<u8>,
    remove_only: bool,
}

fn arbitrary_group() -> impl Strategy<Value = Option<String>> {
    (0..GROUPS.len()).prop_map(|i| GROUPS[i].map(str::to_owned))
}

fn arbitrary_step() -> impl Strategy<Value = Step> {
    (
        0u8..5,
        arbitrary_group(),
        prop::collection::btree_set(0u8..6, 0..4),
        any::<bool>(),
    )
        .prop_map(|(key, group, values, remove_only)| Step {
            key,
            group,
            values,
            remove_only,
        })
}

fn apply(relation: &mut GroupedRelation<u8, u8>, step: &Step) {
    relation.remove_key(&step.key);
    if !step.remove_only {
        let _ = relation.try_put(step.key, step.group.clone(), step.values.clone());
    }
}

fn check_invariants(relation: &GroupedRelation<u8, u8>) -> Result<(), TestCaseError> {
    let groups: Vec<&str> = GROUPS.iter().flatten().copied().collect();

    for (i, g1) in groups.iter().enumerate() {
        for g2 in &groups[i + 1..] {
            if let (Some(a), Some(b)) = (
                relation.get_values_of_group(g1),
                relation.get_values_of_group(g2),
            ) {
                prop_assert!(a.is_disjoint(b), "{g1} and {g2} share values");
            }
        }
    }

    for (key, grouped) in relation.entries() {
        if let Some(group) = grouped.group() {
            prop_assert_eq!(
                relation.get_values_of_group(group),
                Some(grouped.values()),
                "key {} diverges from its group",
                key
            );
        }
        for value in grouped.values() {
            prop_assert!(relation.export().get_keys(value).contains(key));
        }
    }
    Ok(())
}

proptest! {
    #[test]
    fn numeric_grouped_round_trips(
        group in arbitrary_group(),
        values in prop::collection::btree_set(any::<u32>(), 0..8),
    ) {
        let grouped = Grouped::with_group(group, values);
        let json = grouped.to_json().unwrap();
        let decoded = Grouped::from_json(&json, serde_decoder::<u32>).unwrap();
        prop_assert_eq!(decoded, grouped);
    }

    #[test]
    fn string_binding_round_trips(
        group in arbitrary_group(),
        values in prop::collection::btree_set(any::<u16>(), 0..8),
    ) {
        let grouped = Grouped::with_group(
            group,
            values.into_iter().map(|v| format!("topic:{v}")),
        );
        let binding = encode_binding(&grouped).unwrap();
        prop_assert_eq!(decode_binding(&binding, string_decoder).unwrap(), grouped);
    }

    #[test]
    fn checked_puts_preserve_invariants(steps in prop::collection::vec(arbitrary_step(), 1..40)) {
        let mut relation = GroupedRelation::new();
        for step in &steps {
            apply(&mut relation, step);
            check_invariants(&relation)?;
        }
    }

    #[test]
    fn export_is_idempotent(steps in prop::collection::vec(arbitrary_step(), 0..20)) {
        let mut relation = GroupedRelation::new();
        for step in &steps {
            apply(&mut relation, step);
        }
        prop_assert_eq!(relation.export(), relation.export());
    }

    #[test]
    fn removing_every_key_empties_the_relation(
        steps in prop::collection::vec(arbitrary_step(), 0..20),
    ) {
        let mut relation = GroupedRelation::new();
        for step in &steps {
            apply(&mut relation, step);
        }
        let keys: Vec<u8> = relation.keys().copied().collect();
        for key in keys {
            relation.remove_key(&key);
        }
        let snapshot = relation.export();
        prop_assert!(snapshot.is_empty());
        prop_assert!(snapshot.get_values(["alpha", "beta"]).is_empty());
    }
}
