use chrono::{DateTime, Utc};
use common::{AggregateId, LocationId, ProductId};
use event_store::Version;
use serde::Serialize;

use crate::aggregate::Aggregate;

use super::{
    StockError, StockEvent, StockRecordCreatedData, StockTransaction, TransactionType,
    replay_quantity,
};

/// Reference written on the transaction that seeds a new record.
pub(crate) const INITIAL_STOCK_REFERENCE: &str = "Initial stock";

/// Quantity of one product at one location, with its full ledger.
///
/// The quantity only ever changes by applying a `TransactionRecorded`
/// event, so the record and its history cannot drift apart.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StockRecord {
    id: Option<AggregateId>,
    #[serde(skip)]
    version: Version,
    product_id: Option<ProductId>,
    location_id: Option<LocationId>,
    quantity: u32,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    transactions: Vec<StockTransaction>,
}

impl Aggregate for StockRecord {
    type Event = StockEvent;
    type Error = StockError;

    fn aggregate_type() -> &'static str {
        "StockRecord"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            StockEvent::StockRecordCreated(data) => {
                self.id = Some(data.stock_id);
                self.product_id = Some(data.product_id);
                self.location_id = Some(data.location_id);
                self.created_at = Some(data.created_at);
                self.updated_at = Some(data.created_at);
            }
            StockEvent::TransactionRecorded(transaction) => {
                // Decisions guarantee the result stays within u32.
                let next = i64::from(self.quantity) + transaction.quantity;
                self.quantity = u32::try_from(next.max(0)).unwrap_or(u32::MAX);
                self.updated_at = Some(transaction.timestamp);
                self.transactions.push(transaction);
            }
        }
    }
}

impl StockRecord {
    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn location_id(&self) -> Option<LocationId> {
        self.location_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn transactions(&self) -> &[StockTransaction] {
        &self.transactions
    }

    /// True when replaying the ledger reproduces the stored quantity.
    pub fn is_consistent(&self) -> bool {
        replay_quantity(&self.transactions) == i64::from(self.quantity)
    }
}

// Commands
impl StockRecord {
    pub fn create(
        &self,
        stock_id: AggregateId,
        product_id: ProductId,
        location_id: LocationId,
        initial_quantity: i64,
    ) -> Result<Vec<StockEvent>, StockError> {
        if self.id.is_some() {
            return Err(StockError::AlreadyExists {
                product_id,
                location_id,
            });
        }
        let initial = checked_quantity(initial_quantity)?;

        let mut events = vec![StockEvent::StockRecordCreated(StockRecordCreatedData {
            stock_id,
            product_id,
            location_id,
            created_at: Utc::now(),
        })];
        if initial > 0 {
            events.push(StockEvent::TransactionRecorded(StockTransaction::new(
                stock_id,
                TransactionType::StockIn,
                i64::from(initial),
                Some(INITIAL_STOCK_REFERENCE.to_string()),
                None,
            )));
        }
        Ok(events)
    }

    pub fn stock_in(
        &self,
        quantity: i64,
        reference: Option<String>,
        notes: Option<String>,
    ) -> Result<Vec<StockEvent>, StockError> {
        let stock_id = self.require_created()?;
        if quantity <= 0 {
            return Err(StockError::InvalidQuantity("Quantity must be positive"));
        }
        let total = i64::from(self.quantity)
            .checked_add(quantity)
            .ok_or(StockError::InvalidQuantity("Quantity is too large"))?;
        checked_quantity(total)?;

        Ok(vec![self.record(
            stock_id,
            TransactionType::StockIn,
            quantity,
            reference,
            notes,
        )])
    }

    pub fn stock_out(
        &self,
        quantity: i64,
        reference: Option<String>,
        notes: Option<String>,
    ) -> Result<Vec<StockEvent>, StockError> {
        let stock_id = self.require_created()?;
        if quantity <= 0 {
            return Err(StockError::InvalidQuantity("Quantity must be positive"));
        }
        if quantity > i64::from(self.quantity) {
            return Err(StockError::InsufficientStock {
                current: self.quantity,
            });
        }

        Ok(vec![self.record(
            stock_id,
            TransactionType::StockOut,
            -quantity,
            reference,
            notes,
        )])
    }

    /// Sets an absolute quantity. A zero delta is still recorded.
    pub fn adjust(
        &self,
        new_quantity: i64,
        reference: Option<String>,
        notes: Option<String>,
    ) -> Result<Vec<StockEvent>, StockError> {
        let stock_id = self.require_created()?;
        let target = checked_quantity(new_quantity)?;
        let delta = i64::from(target) - i64::from(self.quantity);

        Ok(vec![self.record(
            stock_id,
            TransactionType::Adjustment,
            delta,
            reference,
            notes,
        )])
    }

    /// Dispatches on `kind`; for adjustments `quantity` is the new absolute
    /// quantity.
    pub fn apply_transaction(
        &self,
        kind: TransactionType,
        quantity: i64,
        reference: Option<String>,
        notes: Option<String>,
    ) -> Result<Vec<StockEvent>, StockError> {
        match kind {
            TransactionType::StockIn => self.stock_in(quantity, reference, notes),
            TransactionType::StockOut => self.stock_out(quantity, reference, notes),
            TransactionType::Adjustment => self.adjust(quantity, reference, notes),
            TransactionType::Transfer => Err(StockError::UnsupportedTransaction(kind)),
        }
    }

    fn require_created(&self) -> Result<AggregateId, StockError> {
        self.id.ok_or(StockError::Uninitialized)
    }

    fn record(
        &self,
        stock_id: AggregateId,
        kind: TransactionType,
        quantity: i64,
        reference: Option<String>,
        notes: Option<String>,
    ) -> StockEvent {
        StockEvent::TransactionRecorded(StockTransaction::new(
            stock_id, kind, quantity, reference, notes,
        ))
    }
}

fn checked_quantity(quantity: i64) -> Result<u32, StockError> {
    if quantity < 0 {
        return Err(StockError::InvalidQuantity("Quantity cannot be negative"));
    }
    u32::try_from(quantity).map_err(|_| StockError::InvalidQuantity("Quantity is too large"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(quantity: i64) -> StockRecord {
        let mut record = StockRecord::default();
        let events = record
            .create(
                AggregateId::new(),
                ProductId::new(1),
                LocationId::new(1),
                quantity,
            )
            .unwrap();
        record.apply_events(events);
        record
    }

    fn run(record: &mut StockRecord, events: Result<Vec<StockEvent>, StockError>) {
        record.apply_events(events.unwrap());
    }

    #[test]
    fn create_with_initial_stock_seeds_the_ledger() {
        let record = record_with(10);
        assert_eq!(record.quantity(), 10);
        assert_eq!(record.transactions().len(), 1);
        assert_eq!(
            record.transactions()[0].reference.as_deref(),
            Some(INITIAL_STOCK_REFERENCE)
        );
        assert!(record.is_consistent());
    }

    #[test]
    fn stock_in_rejects_totals_past_the_limit() {
        let record = record_with(10);
        for quantity in [i64::MAX, i64::from(u32::MAX)] {
            assert!(matches!(
                record.stock_in(quantity, None, None),
                Err(StockError::InvalidQuantity("Quantity is too large"))
            ));
        }
        assert!(record
            .stock_in(i64::from(u32::MAX) - 10, None, None)
            .is_ok());
    }

    #[test]
    fn create_with_zero_has_empty_ledger() {
        let record = record_with(0);
        assert_eq!(record.quantity(), 0);
        assert!(record.transactions().is_empty());
    }

    #[test]
    fn create_rejects_negative_and_duplicate() {
        let fresh = StockRecord::default();
        assert!(matches!(
            fresh.create(AggregateId::new(), ProductId::new(1), LocationId::new(1), -1),
            Err(StockError::InvalidQuantity(_))
        ));

        let existing = record_with(1);
        assert!(matches!(
            existing.create(AggregateId::new(), ProductId::new(1), LocationId::new(1), 0),
            Err(StockError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn stock_out_beyond_quantity_reports_current() {
        let record = record_with(10);
        let err = record.stock_out(11, None, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Not enough stock available. Current quantity: 10"
        );
    }

    #[test]
    fn stock_out_to_exactly_zero_is_allowed() {
        let mut record = record_with(10);
        let events = record.stock_out(10, None, None);
        run(&mut record, events);
        assert_eq!(record.quantity(), 0);
        assert!(record.is_consistent());
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        let record = record_with(5);
        assert!(matches!(
            record.stock_in(0, None, None),
            Err(StockError::InvalidQuantity(_))
        ));
        assert!(matches!(
            record.stock_out(-3, None, None),
            Err(StockError::InvalidQuantity(_))
        ));
        assert!(matches!(
            record.adjust(-1, None, None),
            Err(StockError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn adjust_records_signed_delta_and_zero_delta() {
        let mut record = record_with(10);
        let events = record.adjust(4, Some("cycle count".into()), None);
        run(&mut record, events);
        let events = record.adjust(4, Some("cycle count".into()), None);
        run(&mut record, events);

        let deltas: Vec<i64> = record.transactions().iter().map(|t| t.quantity).collect();
        assert_eq!(deltas, vec![10, -6, 0]);
        assert_eq!(record.quantity(), 4);
        assert!(record.is_consistent());
    }

    #[test]
    fn transfer_is_unsupported() {
        let record = record_with(10);
        let err = record
            .apply_transaction(TransactionType::Transfer, 1, None, None)
            .unwrap_err();
        assert!(matches!(err, StockError::UnsupportedTransaction(_)));
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn dispatch_routes_each_kind() {
        let mut record = record_with(10);
        let events = record.apply_transaction(TransactionType::StockIn, 5, None, None);
        run(&mut record, events);
        let events = record.apply_transaction(TransactionType::StockOut, 3, None, None);
        run(&mut record, events);
        let events = record.apply_transaction(TransactionType::Adjustment, 20, None, None);
        run(&mut record, events);

        let kinds: Vec<TransactionType> = record.transactions().iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TransactionType::StockIn,
                TransactionType::StockIn,
                TransactionType::StockOut,
                TransactionType::Adjustment,
            ]
        );
        assert_eq!(record.quantity(), 20);
        assert!(record.is_consistent());
    }

    #[test]
    fn mutations_on_missing_record_fail() {
        let record = StockRecord::default();
        assert!(matches!(
            record.stock_in(1, None, None),
            Err(StockError::Uninitialized)
        ));
    }
}
