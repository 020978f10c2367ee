//! Grouped value sets.
//!
//! A [`Grouped`] pairs an optional group name with a set of members. The
//! relation uses it in both directions: a key's set of values, and a value's
//! set of keys. It is also the unit that gets replicated, so its JSON form is
//! kept as small as possible:
//!
//! ```text
//! { "g": "<group-name>", "a": [<value>, ...] }
//! ```
//!
//! `g` is omitted when there is no group.

use crate::error::{RelationError, RelationResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt::Display;

/// JSON field holding the group name
pub const GROUP_FIELD: &str = "g";

/// JSON field holding the member array
pub const VALUES_FIELD: &str = "a";

/// Optional group name plus a set of members.
///
/// Treated as immutable once handed out; only the relation's own merge
/// helpers touch the member set in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(bound(
    serialize = "T: Serialize",
    deserialize = "T: Deserialize<'de> + Ord"
))]
pub struct Grouped<T> {
    #[serde(rename = "g", default, skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    #[serde(rename = "a", default = "BTreeSet::new")]
    values: BTreeSet<T>,
}

/// A grouped set of topic values, as published per subscriber
pub type GroupedValueSet<V> = Grouped<V>;

impl<T: Ord> Grouped<T> {
    /// Ungrouped set
    pub fn of(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            group: None,
            values: values.into_iter().collect(),
        }
    }

    /// Set with an optional group.
    ///
    /// An empty group name is the ungrouped bucket and is stored as no group.
    pub fn with_group(group: Option<String>, values: impl IntoIterator<Item = T>) -> Self {
        Self {
            group: group.filter(|name| !name.is_empty()),
            values: values.into_iter().collect(),
        }
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn values(&self) -> &BTreeSet<T> {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_parts(self) -> (Option<String>, BTreeSet<T>) {
        (self.group, self.values)
    }

    pub(crate) fn insert(&mut self, member: T) {
        self.values.insert(member);
    }

    pub(crate) fn remove(&mut self, member: &T) -> bool {
        self.values.remove(member)
    }

    pub(crate) fn extend(&mut self, members: impl IntoIterator<Item = T>) {
        self.values.extend(members);
    }
}

impl<T: Ord + Serialize> Grouped<T> {
    /// Encode as the compact `{"g", "a"}` object.
    pub fn to_json(&self) -> RelationResult<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

impl<T: Ord> Grouped<T> {
    /// Decode the compact object, converting each member with `decoder`.
    ///
    /// A missing `g` (or an empty one) means no group, a missing `a` means
    /// no members.
    pub fn from_json<F, E>(json: &Value, decoder: F) -> RelationResult<Self>
    where
        F: Fn(&Value) -> Result<T, E>,
        E: Display,
    {
        let object = json
            .as_object()
            .ok_or_else(|| RelationError::malformed(json.to_string(), "expected a JSON object"))?;

        let group = decode_group(json, object)?;
        let values = match object.get(VALUES_FIELD) {
            None | Some(Value::Null) => BTreeSet::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    decoder(item).map_err(|e| RelationError::malformed(json.to_string(), e.to_string()))
                })
                .collect::<RelationResult<BTreeSet<T>>>()?,
            Some(_) => {
                return Err(RelationError::malformed(
                    json.to_string(),
                    "field \"a\" must be an array",
                ))
            }
        };

        Ok(Self { group, values })
    }
}

fn decode_group(json: &Value, object: &Map<String, Value>) -> RelationResult<Option<String>> {
    match object.get(GROUP_FIELD) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(group)) if group.is_empty() => Ok(None),
        Some(Value::String(group)) => Ok(Some(group.clone())),
        Some(_) => Err(RelationError::malformed(
            json.to_string(),
            "field \"g\" must be a string",
        )),
    }
}

/// Decoder for string-valued members.
pub fn string_decoder(json: &Value) -> Result<String, RelationError> {
    json.as_str()
        .map(str::to_owned)
        .ok_or_else(|| RelationError::malformed(json.to_string(), "expected a JSON string"))
}

/// Decoder for any member type with a serde representation.
pub fn serde_decoder<T: serde::de::DeserializeOwned>(json: &Value) -> Result<T, serde_json::Error> {
    T::deserialize(json)
}
