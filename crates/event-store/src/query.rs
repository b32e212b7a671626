use crate::{AggregateId, Version};

/// Filter over stored events. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub aggregate_id: Option<AggregateId>,
    pub aggregate_type: Option<String>,
    /// Matches any of the listed event types.
    pub event_types: Option<Vec<String>>,
    /// Inclusive lower bound on version.
    pub from_version: Option<Version>,
    pub limit: Option<usize>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_aggregate(aggregate_id: AggregateId) -> Self {
        Self::new().aggregate_id(aggregate_id)
    }

    pub fn for_event_type(event_type: impl Into<String>) -> Self {
        Self::new().event_type(event_type)
    }

    pub fn aggregate_id(mut self, id: AggregateId) -> Self {
        self.aggregate_id = Some(id);
        self
    }

    pub fn aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_types = Some(vec![event_type.into()]);
        self
    }

    pub fn event_types<I, S>(mut self, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.event_types = Some(event_types.into_iter().map(Into::into).collect());
        self
    }

    pub fn from_version(mut self, version: Version) -> Self {
        self.from_version = Some(version);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluates the filter against one event; the in-memory store uses this
    /// and the Postgres store renders the same predicate as SQL.
    pub fn matches(&self, event: &crate::EventEnvelope) -> bool {
        self.aggregate_id.is_none_or(|id| event.aggregate_id == id)
            && self
                .aggregate_type
                .as_ref()
                .is_none_or(|t| &event.aggregate_type == t)
            && self
                .event_types
                .as_ref()
                .is_none_or(|types| types.contains(&event.event_type))
            && self.from_version.is_none_or(|v| event.version >= v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventEnvelope;

    fn event(aggregate_type: &str, event_type: &str, version: i64) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type(aggregate_type)
            .event_type(event_type)
            .version(Version::new(version))
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(EventQuery::new().matches(&event("StockRecord", "TransactionRecorded", 3)));
    }

    #[test]
    fn filters_combine_conjunctively() {
        let query = EventQuery::new()
            .aggregate_type("StockRecord")
            .event_types(["StockRecordCreated", "TransactionRecorded"])
            .from_version(Version::new(2));

        assert!(query.matches(&event("StockRecord", "TransactionRecorded", 2)));
        assert!(!query.matches(&event("StockRecord", "TransactionRecorded", 1)));
        assert!(!query.matches(&event("Order", "TransactionRecorded", 2)));
        assert!(!query.matches(&event("StockRecord", "HoldPlaced", 2)));
    }
}
