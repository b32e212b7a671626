//! The stock ledger: per-(product, location) quantities backed by an
//! append-only transaction history.

use std::sync::Arc;

use common::{AggregateId, LocationId, ProductId};
use domain::publisher::{EventPublisher, publish_json, topics};
use domain::stock::StockRecordCreatedData;
use domain::{
    Aggregate, CommandHandler, CommandResult, DomainError, StockError, StockEvent, StockRecord,
    StockTransaction, TransactionType,
};
use event_store::{EventQuery, EventStore, EventStoreError, UniqueKey};

/// Unique-key scope enforcing one stock record per (product, location).
pub const STOCK_RECORD_KEY_SCOPE: &str = "stock_record";

pub fn stock_record_key(product_id: ProductId, location_id: LocationId) -> UniqueKey {
    UniqueKey::new(STOCK_RECORD_KEY_SCOPE, format!("{product_id}:{location_id}"))
}

/// Every mutation is one append carrying both the quantity change and its
/// ledger entry, guarded by the record's stream version. Stale writers
/// reload and decide again, so two concurrent stock-outs can never both
/// draw on the same units.
pub struct StockLedger<S: EventStore> {
    records: CommandHandler<S, StockRecord>,
    publisher: Arc<dyn EventPublisher>,
}

impl<S: EventStore + Clone> Clone for StockLedger<S> {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
            publisher: Arc::clone(&self.publisher),
        }
    }
}

impl<S: EventStore> StockLedger<S> {
    pub fn new(store: S, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            records: CommandHandler::new(store),
            publisher,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.records = self.records.with_max_retries(max_retries);
        self
    }

    pub fn store(&self) -> &S {
        self.records.store()
    }

    /// Creates the record for a (product, location) pair.
    ///
    /// An initial quantity above zero is written as a StockIn in the same
    /// append, so the history always replays to the stored quantity.
    #[tracing::instrument(skip(self))]
    pub async fn create(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        initial_quantity: i64,
    ) -> Result<StockRecord, DomainError> {
        let stock_id = AggregateId::new();
        let key = stock_record_key(product_id, location_id);

        let result = self
            .records
            .create(stock_id, vec![key], |record| {
                record.create(stock_id, product_id, location_id, initial_quantity)
            })
            .await
            .map_err(|err| match err {
                DomainError::EventStore(EventStoreError::DuplicateKey { .. }) => {
                    StockError::AlreadyExists {
                        product_id,
                        location_id,
                    }
                    .into()
                }
                other => other,
            })?;

        tracing::info!(%stock_id, quantity = result.aggregate.quantity(), "stock record created");
        publish_json(&*self.publisher, topics::INVENTORY_CREATED, &result.aggregate).await;
        self.emit_transactions(&result).await;
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self, notes))]
    pub async fn stock_in(
        &self,
        stock_id: AggregateId,
        quantity: i64,
        reference: Option<String>,
        notes: Option<String>,
    ) -> Result<StockRecord, DomainError> {
        self.mutate(stock_id, |record| {
            record.stock_in(quantity, reference.clone(), notes.clone())
        })
        .await
    }

    #[tracing::instrument(skip(self, notes))]
    pub async fn stock_out(
        &self,
        stock_id: AggregateId,
        quantity: i64,
        reference: Option<String>,
        notes: Option<String>,
    ) -> Result<StockRecord, DomainError> {
        let result = self
            .mutate(stock_id, |record| {
                record.stock_out(quantity, reference.clone(), notes.clone())
            })
            .await;
        if let Err(DomainError::Stock(StockError::InsufficientStock { current })) = &result {
            tracing::warn!(%stock_id, requested = quantity, current, "stock out rejected");
            metrics::counter!("stock_out_rejected_total").increment(1);
        }
        result
    }

    /// Sets the absolute quantity; the ledger entry carries the delta.
    #[tracing::instrument(skip(self, notes))]
    pub async fn adjust(
        &self,
        stock_id: AggregateId,
        new_quantity: i64,
        reference: Option<String>,
        notes: Option<String>,
    ) -> Result<StockRecord, DomainError> {
        self.mutate(stock_id, |record| {
            record.adjust(new_quantity, reference.clone(), notes.clone())
        })
        .await
    }

    /// Dispatches on `kind`. Transfers are rejected before anything loads.
    pub async fn apply_transaction(
        &self,
        stock_id: AggregateId,
        kind: TransactionType,
        quantity: i64,
        reference: Option<String>,
        notes: Option<String>,
    ) -> Result<StockRecord, DomainError> {
        match kind {
            TransactionType::StockIn => self.stock_in(stock_id, quantity, reference, notes).await,
            TransactionType::StockOut => self.stock_out(stock_id, quantity, reference, notes).await,
            TransactionType::Adjustment => self.adjust(stock_id, quantity, reference, notes).await,
            TransactionType::Transfer => Err(StockError::UnsupportedTransaction(kind).into()),
        }
    }

    pub async fn query(&self, stock_id: AggregateId) -> Result<Option<StockRecord>, DomainError> {
        self.records.load_existing(stock_id).await
    }

    /// Like [`query`](Self::query) but a missing record is an error.
    pub async fn get(&self, stock_id: AggregateId) -> Result<StockRecord, DomainError> {
        self.query(stock_id)
            .await?
            .ok_or_else(|| StockError::NotFound(stock_id).into())
    }

    pub async fn find(
        &self,
        product_id: ProductId,
        location_id: LocationId,
    ) -> Result<Option<StockRecord>, DomainError> {
        let key = stock_record_key(product_id, location_id);
        match self.store().resolve_key(&key).await? {
            Some(stock_id) => self.query(stock_id).await,
            None => Ok(None),
        }
    }

    pub async fn query_by_product(&self, product_id: ProductId) -> Result<Vec<StockRecord>, DomainError> {
        self.query_where(|created| created.product_id == product_id)
            .await
    }

    pub async fn query_by_location(
        &self,
        location_id: LocationId,
    ) -> Result<Vec<StockRecord>, DomainError> {
        self.query_where(|created| created.location_id == location_id)
            .await
    }

    pub async fn transactions(&self, stock_id: AggregateId) -> Result<Vec<StockTransaction>, DomainError> {
        Ok(self.get(stock_id).await?.transactions().to_vec())
    }

    /// On-hand quantity summed over every location holding the product.
    pub async fn total_for_product(&self, product_id: ProductId) -> Result<i64, DomainError> {
        Ok(self
            .query_by_product(product_id)
            .await?
            .iter()
            .map(|record| i64::from(record.quantity()))
            .sum())
    }

    async fn query_where<P>(&self, predicate: P) -> Result<Vec<StockRecord>, DomainError>
    where
        P: Fn(&StockRecordCreatedData) -> bool,
    {
        let query = EventQuery::for_event_type("StockRecordCreated")
            .aggregate_type(StockRecord::aggregate_type());
        let created = self.store().query_events(query).await?;

        let mut records = Vec::new();
        for envelope in created {
            let StockEvent::StockRecordCreated(data) = envelope.decode::<StockEvent>()? else {
                continue;
            };
            if !predicate(&data) {
                continue;
            }
            if let Some(record) = self.query(data.stock_id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn mutate<F>(&self, stock_id: AggregateId, decide: F) -> Result<StockRecord, DomainError>
    where
        F: Fn(&StockRecord) -> Result<Vec<StockEvent>, StockError>,
    {
        let result = self
            .records
            .execute_with_retry(stock_id, decide)
            .await
            .map_err(|err| match err {
                DomainError::Stock(StockError::Uninitialized) => StockError::NotFound(stock_id).into(),
                other => other,
            })?;

        publish_json(&*self.publisher, topics::INVENTORY_UPDATED, &result.aggregate).await;
        self.emit_transactions(&result).await;
        Ok(result.aggregate)
    }

    async fn emit_transactions(&self, result: &CommandResult<StockRecord>) {
        let record = &result.aggregate;
        for event in &result.events {
            let StockEvent::TransactionRecorded(transaction) = event else {
                continue;
            };
            metrics::counter!("stock_transactions_total", "type" => transaction.kind.as_str())
                .increment(1);
            tracing::debug!(
                stock_id = %transaction.stock_id,
                kind = %transaction.kind,
                quantity = transaction.quantity,
                "ledger entry appended"
            );
            let payload = serde_json::json!({
                "transaction": transaction,
                "productId": record.product_id(),
                "locationId": record.location_id(),
                "quantityAfter": record.quantity(),
            });
            self.publisher
                .publish(topics::INVENTORY_TRANSACTION_CREATED, payload)
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ErrorKind, InMemoryPublisher};
    use event_store::InMemoryEventStore;

    fn ledger() -> (StockLedger<InMemoryEventStore>, InMemoryPublisher) {
        let publisher = InMemoryPublisher::new();
        let ledger = StockLedger::new(InMemoryEventStore::new(), Arc::new(publisher.clone()));
        (ledger, publisher)
    }

    #[tokio::test]
    async fn create_claims_the_pair() {
        let (ledger, _) = ledger();
        ledger
            .create(ProductId::new(1), LocationId::new(1), 10)
            .await
            .unwrap();

        let err = ledger
            .create(ProductId::new(1), LocationId::new(1), 0)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(matches!(
            err,
            DomainError::Stock(StockError::AlreadyExists { .. })
        ));

        ledger
            .create(ProductId::new(1), LocationId::new(2), 0)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_stock_id_is_not_found() {
        let (ledger, _) = ledger();
        let err = ledger
            .stock_in(AggregateId::new(), 5, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn transfer_is_unsupported() {
        let (ledger, _) = ledger();
        let record = ledger
            .create(ProductId::new(1), LocationId::new(1), 10)
            .await
            .unwrap();
        let err = ledger
            .apply_transaction(record.id().unwrap(), TransactionType::Transfer, 1, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
        assert_eq!(ledger.get(record.id().unwrap()).await.unwrap().quantity(), 10);
    }

    #[tokio::test]
    async fn mutations_publish_record_and_entry() {
        let (ledger, publisher) = ledger();
        let record = ledger
            .create(ProductId::new(3), LocationId::new(1), 0)
            .await
            .unwrap();
        ledger
            .stock_in(record.id().unwrap(), 4, Some("PO-1".into()), None)
            .await
            .unwrap();

        assert_eq!(
            publisher.topics(),
            vec![
                topics::INVENTORY_CREATED.to_string(),
                topics::INVENTORY_UPDATED.to_string(),
                topics::INVENTORY_TRANSACTION_CREATED.to_string(),
            ]
        );
        let entry = &publisher.events_for(topics::INVENTORY_TRANSACTION_CREATED)[0];
        assert_eq!(entry["transaction"]["reference"], "PO-1");
        assert_eq!(entry["quantityAfter"], 4);
    }

    #[tokio::test]
    async fn lookups_by_product_and_location() {
        let (ledger, _) = ledger();
        ledger.create(ProductId::new(1), LocationId::new(1), 5).await.unwrap();
        ledger.create(ProductId::new(1), LocationId::new(2), 7).await.unwrap();
        ledger.create(ProductId::new(2), LocationId::new(1), 1).await.unwrap();

        assert_eq!(ledger.query_by_product(ProductId::new(1)).await.unwrap().len(), 2);
        assert_eq!(ledger.query_by_location(LocationId::new(1)).await.unwrap().len(), 2);
        assert_eq!(ledger.total_for_product(ProductId::new(1)).await.unwrap(), 12);
        assert!(
            ledger
                .find(ProductId::new(2), LocationId::new(2))
                .await
                .unwrap()
                .is_none()
        );
    }
}
