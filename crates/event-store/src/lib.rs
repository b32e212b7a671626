//! Append-only event streams with optimistic concurrency and unique-key claims.
//!
//! Every aggregate in the workspace persists through [`EventStore`]. Appends
//! carry the version the caller last observed; a stale version fails with
//! [`EventStoreError::ConcurrencyConflict`] and nothing is written. An append
//! may also claim unique keys (a `(product, location)` pair, a purchase-order
//! number) in the same atomic write.

pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::AggregateId;
pub use error::{EventStoreError, Result};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use query::EventQuery;
pub use store::{AppendOptions, EventStore, EventStoreExt, UniqueKey};
