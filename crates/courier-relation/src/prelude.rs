//! Courier relation prelude.
//!
//! Curated re-exports for subscription bookkeeping.

pub use crate::{
    decode_binding, encode_binding, string_decoder, Grouped, GroupedRelation, RelationError,
    RelationResult, RelationSnapshot, UNGROUPED,
};
