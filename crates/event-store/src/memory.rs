use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, Version,
    store::{AppendOptions, EventStore, UniqueKey, validate_events_for_append},
};

#[derive(Default)]
struct Inner {
    events: Vec<EventEnvelope>,
    versions: HashMap<AggregateId, Version>,
    keys: HashMap<UniqueKey, AggregateId>,
}

/// Event store held entirely in process memory.
///
/// Version check, key claims and the append itself happen under one write
/// lock, which gives the same all-or-nothing behavior as the Postgres store.
#[derive(Clone, Default)]
pub struct InMemoryEventStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn event_count(&self) -> usize {
        self.inner.read().await.events.len()
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        *inner = Inner::default();
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        validate_events_for_append(&events)?;
        let aggregate_id = events[0].aggregate_id;
        let first_version = events[0].version;

        let mut inner = self.inner.write().await;
        let current = inner
            .versions
            .get(&aggregate_id)
            .copied()
            .unwrap_or_else(Version::initial);

        if let Some(expected) = options.expected_version
            && current != expected
        {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual: current,
            });
        }

        // Mirrors the (aggregate_id, version) unique constraint in Postgres.
        if first_version != current.next() {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: options.expected_version.unwrap_or(current),
                actual: current,
            });
        }

        for key in &options.unique_keys {
            if let Some(owner) = inner.keys.get(key)
                && *owner != aggregate_id
            {
                return Err(EventStoreError::DuplicateKey {
                    scope: key.scope.clone(),
                    key: key.key.clone(),
                    owner: *owner,
                });
            }
        }

        for key in options.unique_keys {
            inner.keys.insert(key, aggregate_id);
        }

        let last_version = events
            .last()
            .map(|e| e.version)
            .unwrap_or(first_version);
        inner.versions.insert(aggregate_id, last_version);
        inner.events.extend(events);

        Ok(last_version)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let inner = self.inner.read().await;
        // Appends are version-ordered per stream, so insertion order suffices.
        Ok(inner
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .cloned()
            .collect())
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let inner = self.inner.read().await;
        let matching = inner.events.iter().filter(|e| query.matches(e)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        Ok(self.inner.read().await.versions.get(&aggregate_id).copied())
    }

    async fn resolve_key(&self, key: &UniqueKey) -> Result<Option<AggregateId>> {
        Ok(self.inner.read().await.keys.get(key).copied())
    }
}
