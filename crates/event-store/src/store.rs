use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{AggregateId, EventEnvelope, EventQuery, EventStoreError, Result, Version};

/// A `(scope, key)` pair that at most one stream may own.
///
/// Claims are written in the same atomic step as the events they accompany,
/// so a stream that loses the race for a key never exists at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueKey {
    pub scope: String,
    pub key: String,
}

impl UniqueKey {
    pub fn new(scope: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            key: key.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppendOptions {
    /// Version the caller last observed. `None` skips the check.
    pub expected_version: Option<Version>,
    pub unique_keys: Vec<UniqueKey>,
}

impl AppendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
            ..Self::default()
        }
    }

    /// The stream must not exist yet.
    pub fn expect_new() -> Self {
        Self::expect_version(Version::initial())
    }

    pub fn claim(mut self, key: UniqueKey) -> Self {
        self.unique_keys.push(key);
        self
    }
}

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends events to one stream atomically and returns its new version.
    ///
    /// Fails with `ConcurrencyConflict` when `expected_version` is stale and
    /// with `DuplicateKey` when a claimed key belongs to another stream.
    /// Re-claiming a key the same stream already owns is accepted.
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version>;

    /// All events of a stream in version order.
    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>>;

    /// Events matching the query, oldest first.
    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>>;

    async fn get_events_by_type(&self, event_type: &str) -> Result<Vec<EventEnvelope>> {
        self.query_events(EventQuery::for_event_type(event_type))
            .await
    }

    /// Current version of a stream, or `None` if it has no events.
    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;

    /// The stream that owns a unique key, if any.
    async fn resolve_key(&self, key: &UniqueKey) -> Result<Option<AggregateId>>;
}

#[async_trait]
pub trait EventStoreExt: EventStore {
    async fn append_event(&self, event: EventEnvelope, options: AppendOptions) -> Result<Version> {
        self.append(vec![event], options).await
    }

    async fn aggregate_exists(&self, aggregate_id: AggregateId) -> Result<bool> {
        Ok(self.get_aggregate_version(aggregate_id).await?.is_some())
    }
}

impl<T: EventStore + ?Sized> EventStoreExt for T {}

/// Checks that a batch targets a single stream with consecutive versions.
pub fn validate_events_for_append(events: &[EventEnvelope]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append an empty batch".to_string(),
        ));
    };

    let mut expected_version = first.version;
    for event in &events[1..] {
        if event.aggregate_id != first.aggregate_id || event.aggregate_type != first.aggregate_type
        {
            return Err(EventStoreError::InvalidAppend(
                "all events in a batch must target the same stream".to_string(),
            ));
        }
        expected_version = expected_version.next();
        if event.version != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "versions must be consecutive: expected {expected_version}, got {}",
                event.version
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(aggregate_id: AggregateId, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(aggregate_id)
            .aggregate_type("StockRecord")
            .event_type("TransactionRecorded")
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[test]
    fn rejects_empty_batch() {
        assert!(matches!(
            validate_events_for_append(&[]),
            Err(EventStoreError::InvalidAppend(_))
        ));
    }

    #[test]
    fn rejects_gaps_in_versions() {
        let id = AggregateId::new();
        let result = validate_events_for_append(&[event(id, 1), event(id, 3)]);
        assert!(matches!(result, Err(EventStoreError::InvalidAppend(_))));
    }

    #[test]
    fn rejects_mixed_streams() {
        let result =
            validate_events_for_append(&[event(AggregateId::new(), 1), event(AggregateId::new(), 2)]);
        assert!(result.is_err());
    }

    #[test]
    fn accepts_consecutive_batch() {
        let id = AggregateId::new();
        assert!(validate_events_for_append(&[event(id, 4), event(id, 5)]).is_ok());
    }

    #[test]
    fn append_options_accumulate_claims() {
        let options = AppendOptions::expect_new()
            .claim(UniqueKey::new("stock_record", "1:2"))
            .claim(UniqueKey::new("other", "x"));
        assert_eq!(options.expected_version, Some(Version::initial()));
        assert_eq!(options.unique_keys.len(), 2);
    }
}
