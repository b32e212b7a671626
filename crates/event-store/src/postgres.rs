use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventQuery, EventStoreError, Result, Version,
    store::{AppendOptions, EventStore, UniqueKey, validate_events_for_append},
};

const EVENT_COLUMNS: &str =
    "id, event_type, aggregate_id, aggregate_type, version, timestamp, payload, metadata";

/// Event store backed by the `events` and `unique_keys` tables.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata: HashMap<String, serde_json::Value> =
            serde_json::from_value(row.try_get("metadata")?)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            timestamp: row.try_get("timestamp")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }

    async fn claim_key(
        tx: &mut Transaction<'_, Postgres>,
        key: &UniqueKey,
        aggregate_id: AggregateId,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO unique_keys (scope, key, aggregate_id) VALUES ($1, $2, $3) \
             ON CONFLICT (scope, key) DO NOTHING",
        )
        .bind(&key.scope)
        .bind(&key.key)
        .bind(aggregate_id.as_uuid())
        .execute(&mut **tx)
        .await?;

        let owner: Uuid =
            sqlx::query_scalar("SELECT aggregate_id FROM unique_keys WHERE scope = $1 AND key = $2")
                .bind(&key.scope)
                .bind(&key.key)
                .fetch_one(&mut **tx)
                .await?;

        if owner != aggregate_id.as_uuid() {
            return Err(EventStoreError::DuplicateKey {
                scope: key.scope.clone(),
                key: key.key.clone(),
                owner: AggregateId::from_uuid(owner),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, events, options), fields(aggregate_id = tracing::field::Empty, count = events.len()))]
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        validate_events_for_append(&events)?;
        let aggregate_id = events[0].aggregate_id;
        tracing::Span::current().record("aggregate_id", tracing::field::display(aggregate_id));

        let mut tx = self.pool.begin().await?;

        if let Some(expected) = options.expected_version {
            let current: Option<i64> =
                sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                    .bind(aggregate_id.as_uuid())
                    .fetch_one(&mut *tx)
                    .await?;
            let actual = Version::new(current.unwrap_or(0));

            if actual != expected {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id,
                    expected,
                    actual,
                });
            }
        }

        for key in &options.unique_keys {
            Self::claim_key(&mut tx, key, aggregate_id).await?;
        }

        let mut last_version = Version::initial();
        for event in &events {
            sqlx::query(&format!(
                "INSERT INTO events ({EVENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            ))
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.aggregate_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(event.version.as_i64())
            .bind(event.timestamp)
            .bind(&event.payload)
            .bind(serde_json::to_value(&event.metadata)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                // A concurrent writer committed the same version first.
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_aggregate_version")
                {
                    return EventStoreError::ConcurrencyConflict {
                        aggregate_id,
                        expected: options.expected_version.unwrap_or(Version::initial()),
                        actual: event.version,
                    };
                }
                EventStoreError::Database(e)
            })?;

            last_version = event.version;
        }

        tx.commit().await?;
        Ok(last_version)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE aggregate_id = $1 ORDER BY version ASC"
        ))
        .bind(aggregate_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let mut sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE 1=1");
        let mut param = 0;
        let mut next = || {
            param += 1;
            param
        };

        if query.aggregate_id.is_some() {
            sql.push_str(&format!(" AND aggregate_id = ${}", next()));
        }
        if query.aggregate_type.is_some() {
            sql.push_str(&format!(" AND aggregate_type = ${}", next()));
        }
        if query.event_types.is_some() {
            sql.push_str(&format!(" AND event_type = ANY(${})", next()));
        }
        if query.from_version.is_some() {
            sql.push_str(&format!(" AND version >= ${}", next()));
        }
        sql.push_str(" ORDER BY sequence ASC");
        if query.limit.is_some() {
            sql.push_str(&format!(" LIMIT ${}", next()));
        }

        let mut statement = sqlx::query(&sql);
        if let Some(id) = query.aggregate_id {
            statement = statement.bind(id.as_uuid());
        }
        if let Some(aggregate_type) = query.aggregate_type {
            statement = statement.bind(aggregate_type);
        }
        if let Some(event_types) = query.event_types {
            statement = statement.bind(event_types);
        }
        if let Some(from_version) = query.from_version {
            statement = statement.bind(from_version.as_i64());
        }
        if let Some(limit) = query.limit {
            statement = statement.bind(limit as i64);
        }

        let rows = statement.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }

    async fn resolve_key(&self, key: &UniqueKey) -> Result<Option<AggregateId>> {
        let owner: Option<Uuid> =
            sqlx::query_scalar("SELECT aggregate_id FROM unique_keys WHERE scope = $1 AND key = $2")
                .bind(&key.scope)
                .bind(&key.key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(owner.map(AggregateId::from_uuid))
    }
}
