//! Load, decide, append: the write path shared by every aggregate.

use std::marker::PhantomData;

use common::AggregateId;
use event_store::{AppendOptions, EventEnvelope, EventStore, UniqueKey, Version};

use crate::aggregate::{Aggregate, DomainEvent};
use crate::error::DomainError;

/// Retry budget used when a handler is built with [`CommandHandler::new`].
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Outcome of a command that has been persisted.
#[derive(Debug)]
pub struct CommandResult<A: Aggregate> {
    /// State after the new events were applied.
    pub aggregate: A,
    pub events: Vec<A::Event>,
    pub new_version: Version,
}

/// Runs commands against event-sourced aggregates.
///
/// Every command loads the stream, lets the aggregate decide which events
/// to emit and appends them with the loaded version as the expected
/// version. If another writer got there first the append is rejected and
/// nothing is persisted; [`execute_with_retry`](Self::execute_with_retry)
/// reloads and decides again against the fresh state.
pub struct CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
{
    store: S,
    max_retries: u32,
    _phantom: PhantomData<A>,
}

impl<S, A> Clone for CommandHandler<S, A>
where
    S: EventStore + Clone,
    A: Aggregate,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            max_retries: self.max_retries,
            _phantom: PhantomData,
        }
    }
}

impl<S, A> CommandHandler<S, A>
where
    S: EventStore,
    A: Aggregate,
    DomainError: From<A::Error>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_retries: DEFAULT_MAX_RETRIES,
            _phantom: PhantomData,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Rebuilds an aggregate from its stream; unknown ids yield the default.
    pub async fn load(&self, aggregate_id: AggregateId) -> Result<A, DomainError> {
        let events = self.store.get_events_for_aggregate(aggregate_id).await?;

        let mut aggregate = A::default();
        for envelope in events {
            let event: A::Event = serde_json::from_value(envelope.payload)?;
            aggregate.apply(event);
            aggregate.set_version(envelope.version);
        }

        Ok(aggregate)
    }

    pub async fn load_existing(&self, aggregate_id: AggregateId) -> Result<Option<A>, DomainError> {
        let aggregate = self.load(aggregate_id).await?;
        Ok(aggregate.id().is_some().then_some(aggregate))
    }

    /// Single attempt: a concurrent write surfaces as a conflict.
    pub async fn execute<F>(
        &self,
        aggregate_id: AggregateId,
        decide: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
    {
        self.attempt(aggregate_id, Vec::new(), decide).await
    }

    /// Starts a new stream, claiming `unique_keys` in the same write.
    ///
    /// A key already owned by another stream fails with
    /// `EventStoreError::DuplicateKey` and leaves nothing behind.
    pub async fn create<F>(
        &self,
        aggregate_id: AggregateId,
        unique_keys: Vec<UniqueKey>,
        decide: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
    {
        self.attempt(aggregate_id, unique_keys, decide).await
    }

    /// Like [`execute`](Self::execute), retrying on version conflicts.
    ///
    /// `decide` runs once per attempt against freshly loaded state, so a
    /// rejected decision (e.g. insufficient stock) reflects the latest
    /// committed quantity rather than the one first observed.
    pub async fn execute_with_retry<F>(
        &self,
        aggregate_id: AggregateId,
        decide: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: Fn(&A) -> Result<Vec<A::Event>, A::Error>,
    {
        let mut attempt = 0;
        loop {
            match self.attempt(aggregate_id, Vec::new(), &decide).await {
                Err(err) if err.is_concurrency_conflict() => {
                    attempt += 1;
                    metrics::counter!("command_retries_total", "aggregate" => A::aggregate_type())
                        .increment(1);
                    if attempt > self.max_retries {
                        tracing::warn!(
                            %aggregate_id,
                            aggregate_type = A::aggregate_type(),
                            attempts = attempt,
                            "giving up after repeated version conflicts"
                        );
                        return Err(DomainError::ContentionExhausted {
                            aggregate_type: A::aggregate_type(),
                            aggregate_id: aggregate_id.to_string(),
                        });
                    }
                    tracing::debug!(%aggregate_id, attempt, "version conflict, reloading");
                }
                other => return other,
            }
        }
    }

    async fn attempt<F>(
        &self,
        aggregate_id: AggregateId,
        unique_keys: Vec<UniqueKey>,
        decide: F,
    ) -> Result<CommandResult<A>, DomainError>
    where
        F: FnOnce(&A) -> Result<Vec<A::Event>, A::Error>,
    {
        let mut aggregate = self.load(aggregate_id).await?;
        let current_version = aggregate.version();

        let events = decide(&aggregate)?;
        if events.is_empty() {
            return Ok(CommandResult {
                aggregate,
                events,
                new_version: current_version,
            });
        }

        let envelopes = build_envelopes::<A>(aggregate_id, current_version, &events)?;
        let options = AppendOptions {
            expected_version: Some(current_version),
            unique_keys,
        };
        let new_version = self.store.append(envelopes, options).await?;

        aggregate.apply_events(events.iter().cloned());
        aggregate.set_version(new_version);

        Ok(CommandResult {
            aggregate,
            events,
            new_version,
        })
    }
}

fn build_envelopes<A: Aggregate>(
    aggregate_id: AggregateId,
    current_version: Version,
    events: &[A::Event],
) -> Result<Vec<EventEnvelope>, DomainError> {
    let mut version = current_version;
    events
        .iter()
        .map(|event| {
            version = version.next();
            let envelope = EventEnvelope::builder()
                .aggregate_id(aggregate_id)
                .aggregate_type(A::aggregate_type())
                .event_type(event.event_type())
                .version(version)
                .payload(event)?
                .build()?;
            Ok(envelope)
        })
        .collect()
}
