//! Availability and reservations on top of the ledger.

use std::sync::Arc;

use common::{AggregateId, LocationId, ProductId};
use domain::publisher::EventPublisher;
use domain::stock::RESERVATIONS_KEY_SCOPE;
use domain::{Aggregate, CommandHandler, DomainError, ProductReservations, StockError, StockRecord};
use event_store::{EventStore, EventStoreError, UniqueKey};

use crate::ledger::StockLedger;

/// Location new receipts land in when a product has no stock record yet.
pub const DEFAULT_RECEIVING_LOCATION: LocationId = LocationId::new(1);

/// The inventory surface other services call.
///
/// Reservations are logical holds kept in one book per product. They
/// never move stock or write ledger entries; they only reduce what the
/// next availability check sees.
pub struct InventoryService<S: EventStore + Clone> {
    ledger: StockLedger<S>,
    reservations: CommandHandler<S, ProductReservations>,
    receiving_location: LocationId,
}

impl<S: EventStore + Clone> InventoryService<S> {
    pub fn new(store: S, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            ledger: StockLedger::new(store.clone(), publisher),
            reservations: CommandHandler::new(store),
            receiving_location: DEFAULT_RECEIVING_LOCATION,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.ledger = self.ledger.with_max_retries(max_retries);
        self.reservations = self.reservations.with_max_retries(max_retries);
        self
    }

    pub fn with_receiving_location(mut self, location_id: LocationId) -> Self {
        self.receiving_location = location_id;
        self
    }

    pub fn ledger(&self) -> &StockLedger<S> {
        &self.ledger
    }

    /// On-hand stock across all locations minus outstanding holds.
    pub async fn available(&self, product_id: ProductId) -> Result<i64, DomainError> {
        let on_hand = self.ledger.total_for_product(product_id).await?;
        let held = self
            .reservation_book(product_id)
            .await?
            .map(|book| book.held())
            .unwrap_or_default();
        Ok(on_hand - held)
    }

    pub async fn check_availability(
        &self,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<bool, DomainError> {
        Ok(self.available(product_id).await? >= quantity)
    }

    pub async fn reservation_book(
        &self,
        product_id: ProductId,
    ) -> Result<Option<ProductReservations>, DomainError> {
        match self.book_id(product_id).await? {
            Some(book_id) => self.reservations.load_existing(book_id).await,
            None => Ok(None),
        }
    }

    /// Sets the hold for `reference` to `quantity`. Repeating the same
    /// quantity is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        product_id: ProductId,
        quantity: i64,
        reference: &str,
    ) -> Result<(), DomainError> {
        let on_hand = self.ledger.total_for_product(product_id).await?;

        if let Some(book_id) = self.book_id(product_id).await? {
            return self.hold_in(book_id, product_id, quantity, reference, on_hand).await;
        }

        // First hold for this product opens its book. Losing the race to
        // open it means someone else just did; hold in theirs instead.
        let book_id = AggregateId::new();
        let opened = self
            .reservations
            .create(book_id, vec![book_key(product_id)], |book| {
                book.place_hold(book_id, product_id, reference, quantity, on_hand)
            })
            .await;
        match opened {
            Ok(_) => {
                tracing::info!(%book_id, "reservation book opened");
                Ok(())
            }
            Err(DomainError::EventStore(EventStoreError::DuplicateKey { owner, .. })) => {
                self.hold_in(owner, product_id, quantity, reference, on_hand).await
            }
            Err(err) => Err(err),
        }
    }

    /// Drops the hold for `reference`; releasing an unknown hold is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn release(
        &self,
        product_id: ProductId,
        quantity: i64,
        reference: &str,
    ) -> Result<(), DomainError> {
        let Some(book_id) = self.book_id(product_id).await? else {
            return Ok(());
        };
        let result = self
            .reservations
            .execute_with_retry(book_id, |book| Ok(book.release_hold(reference)))
            .await?;
        if result.events.is_empty() {
            tracing::debug!("no hold to release");
        } else {
            tracing::info!(held = result.aggregate.held(), "hold released");
        }
        Ok(())
    }

    /// Receives goods into the product's stock at the receiving location,
    /// creating the record on first receipt.
    #[tracing::instrument(skip(self))]
    pub async fn add_stock(
        &self,
        product_id: ProductId,
        quantity: i64,
        reference: &str,
    ) -> Result<StockRecord, DomainError> {
        let location_id = self.receiving_location;
        let record = match self.ledger.find(product_id, location_id).await? {
            Some(record) => record,
            None => match self.ledger.create(product_id, location_id, 0).await {
                Ok(record) => record,
                Err(DomainError::Stock(StockError::AlreadyExists { .. })) => self
                    .ledger
                    .find(product_id, location_id)
                    .await?
                    .ok_or(StockError::AlreadyExists {
                        product_id,
                        location_id,
                    })?,
                Err(err) => return Err(err),
            },
        };

        let stock_id = record.id().ok_or(StockError::Uninitialized)?;
        self.ledger
            .stock_in(stock_id, quantity, Some(reference.to_string()), None)
            .await
    }

    async fn book_id(&self, product_id: ProductId) -> Result<Option<AggregateId>, DomainError> {
        Ok(self
            .reservations
            .store()
            .resolve_key(&book_key(product_id))
            .await?)
    }

    async fn hold_in(
        &self,
        book_id: AggregateId,
        product_id: ProductId,
        quantity: i64,
        reference: &str,
        on_hand: i64,
    ) -> Result<(), DomainError> {
        let result = self
            .reservations
            .execute_with_retry(book_id, |book| {
                book.place_hold(book_id, product_id, reference, quantity, on_hand)
            })
            .await?;
        tracing::info!(held = result.aggregate.held(), "hold placed");
        Ok(())
    }
}

fn book_key(product_id: ProductId) -> UniqueKey {
    UniqueKey::new(RESERVATIONS_KEY_SCOPE, product_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{ErrorKind, NoopPublisher};
    use event_store::InMemoryEventStore;

    fn service() -> InventoryService<InMemoryEventStore> {
        InventoryService::new(InMemoryEventStore::new(), Arc::new(NoopPublisher))
    }

    #[tokio::test]
    async fn holds_reduce_availability() {
        let service = service();
        service
            .ledger()
            .create(ProductId::new(1), LocationId::new(1), 10)
            .await
            .unwrap();

        service.reserve(ProductId::new(1), 6, "Order-a").await.unwrap();
        assert_eq!(service.available(ProductId::new(1)).await.unwrap(), 4);
        assert!(!service.check_availability(ProductId::new(1), 5).await.unwrap());

        let err = service
            .reserve(ProductId::new(1), 5, "Order-b")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert!(matches!(
            err,
            DomainError::Stock(StockError::InsufficientAvailability { available: 4, .. })
        ));
    }

    #[tokio::test]
    async fn reserve_and_release_are_idempotent() {
        let service = service();
        service
            .ledger()
            .create(ProductId::new(2), LocationId::new(1), 10)
            .await
            .unwrap();

        service.reserve(ProductId::new(2), 3, "Order-x").await.unwrap();
        service.reserve(ProductId::new(2), 3, "Order-x").await.unwrap();
        assert_eq!(service.available(ProductId::new(2)).await.unwrap(), 7);

        service.release(ProductId::new(2), 3, "Order-x").await.unwrap();
        service.release(ProductId::new(2), 3, "Order-x").await.unwrap();
        assert_eq!(service.available(ProductId::new(2)).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn reserving_again_resizes_the_hold() {
        let service = service();
        service
            .ledger()
            .create(ProductId::new(4), LocationId::new(1), 10)
            .await
            .unwrap();

        service.reserve(ProductId::new(4), 3, "Order-z").await.unwrap();
        service.reserve(ProductId::new(4), 8, "Order-z").await.unwrap();
        assert_eq!(service.available(ProductId::new(4)).await.unwrap(), 2);

        let err = service
            .reserve(ProductId::new(4), 11, "Order-z")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(service.available(ProductId::new(4)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn holds_write_no_ledger_entries() {
        let service = service();
        let record = service
            .ledger()
            .create(ProductId::new(3), LocationId::new(1), 5)
            .await
            .unwrap();
        service.reserve(ProductId::new(3), 2, "Order-y").await.unwrap();

        let history = service
            .ledger()
            .transactions(record.id().unwrap())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn releasing_without_a_book_is_a_no_op() {
        service()
            .release(ProductId::new(99), 1, "Order-z")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn add_stock_creates_record_at_receiving_location() {
        let service = service().with_receiving_location(LocationId::new(4));
        let record = service
            .add_stock(ProductId::new(5), 12, "PO-77")
            .await
            .unwrap();
        assert_eq!(record.location_id(), Some(LocationId::new(4)));
        assert_eq!(record.quantity(), 12);

        let record = service.add_stock(ProductId::new(5), 3, "PO-78").await.unwrap();
        assert_eq!(record.quantity(), 15);
        assert_eq!(record.transactions().len(), 2);
    }
}
