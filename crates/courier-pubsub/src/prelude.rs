//! Courier pub/sub prelude.
//!
//! Curated re-exports for pub/sub facades.

pub use crate::{
    AckLabelRegistry, InMemoryMultimap, PubSubConfig, PubSubError, Publisher,
    ReplicatedMultimap, Signal, SignalFilter, SignalSink, SubscriptionConsistencyProtocol,
    SubscriptionManager,
};
pub use courier_relation::prelude::*;
