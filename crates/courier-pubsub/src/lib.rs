#![deny(clippy::dbg_macro)]
#![deny(clippy::todo)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![allow(missing_docs)]
//! # Courier Pub/Sub - grouped subscriptions across a cluster
//!
//! Builds the subscription layer on top of `courier-relation`:
//!
//! - [`SubscriptionManager`]: single writer for one node's subscribers,
//!   implementing the [`SubscriptionConsistencyProtocol`]
//! - [`ReplicatedMultimap`]: capability over the conflict-free multimap that
//!   replicates bindings between nodes, with [`InMemoryMultimap`] as an
//!   in-process replica
//! - [`Publisher`]: resolves recipients against the latest snapshot and
//!   delivers to every ungrouped subscriber and one member per group
//! - [`AckLabelRegistry`]: exclusive ownership of acknowledgement labels
//!
//! ## Design Principles
//!
//! - **Single Writer**: relation state is mutated by one owner per node
//! - **Immutable Reads**: dispatch only sees published snapshots
//! - **Local Completion**: subscribe/unsubscribe resolve once the local
//!   replica and snapshot are updated; remote convergence is not awaited

pub mod acks;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod manager;
pub mod prelude;
pub mod replica;

pub use acks::AckLabelRegistry;
pub use config::PubSubConfig;
pub use dispatch::{select_recipients, AcceptAll, Signal, SignalFilter, SignalSink};
pub use error::{PubSubError, Result};
pub use manager::{Publisher, SubscriptionConsistencyProtocol, SubscriptionManager};
pub use replica::{InMemoryMultimap, ReplicatedMultimap};
