#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![allow(missing_docs)]
//! # Courier Relation - grouped subscription index
//!
//! The routing core of Courier's clustered pub/sub layer:
//!
//! - [`Grouped`]: optional group name plus a set of members, with its compact
//!   JSON form
//! - [`GroupedRelation`]: the mutable key/value index, a disjoint union of
//!   complete bipartite components (one per group)
//! - [`RelationSnapshot`]: immutable export used on the dispatch path
//! - [`codec`]: conversion between grouped sets and replicated binding
//!   strings
//!
//! ## Ownership
//!
//! The relation has no internal locking. One task per node owns it and
//! publishes snapshots; readers only ever see snapshots.

pub mod codec;
pub mod error;
pub mod grouped;
pub mod prelude;
pub mod relation;
pub mod snapshot;

pub use codec::{
    decode_binding, deserialize_replicated_bindings, deserialize_replicated_bindings_lenient,
    deserialize_replicated_bindings_strict, encode_binding, relation_from_bindings,
};
pub use error::{RelationError, RelationResult};
pub use grouped::{serde_decoder, string_decoder, Grouped, GroupedValueSet};
pub use relation::GroupedRelation;
pub use snapshot::{RelationSnapshot, UNGROUPED};
