use std::collections::BTreeMap;

use chrono::Utc;
use common::{AggregateId, ProductId};
use event_store::Version;

use crate::aggregate::Aggregate;

use super::{ReservationEvent, StockError};

/// Unique-key scope mapping a product id to its reservation book stream.
pub const RESERVATIONS_KEY_SCOPE: &str = "product_reservations";

/// Logical holds against a product's stock, keyed by reference.
///
/// Holds never touch stock records or write ledger entries; they only
/// lower what later reservations see as available. A hold is set to a
/// quantity per reference, so placing the same quantity twice or releasing
/// twice changes nothing and a saga step can be replayed safely.
#[derive(Debug, Clone, Default)]
pub struct ProductReservations {
    id: Option<AggregateId>,
    version: Version,
    product_id: Option<ProductId>,
    holds: BTreeMap<String, u32>,
}

impl Aggregate for ProductReservations {
    type Event = ReservationEvent;
    type Error = StockError;

    fn aggregate_type() -> &'static str {
        "ProductReservations"
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
            ReservationEvent::ReservationBookOpened {
                book_id,
                product_id,
            } => {
                self.id = Some(book_id);
                self.product_id = Some(product_id);
            }
            ReservationEvent::HoldPlaced {
                reference,
                quantity,
                ..
            } => {
                self.holds.insert(reference, quantity);
            }
            ReservationEvent::HoldReleased { reference, .. } => {
                self.holds.remove(&reference);
            }
        }
    }
}

impl ProductReservations {
    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn held(&self) -> i64 {
        self.holds.values().map(|q| i64::from(*q)).sum()
    }

    pub fn hold_for(&self, reference: &str) -> Option<u32> {
        self.holds.get(reference).copied()
    }

    /// Sets the hold for `reference` to `quantity` if `on_hand` minus the
    /// other holds covers it. An existing hold may grow or shrink.
    ///
    /// Opens the book in the same batch when it does not exist yet.
    pub fn place_hold(
        &self,
        book_id: AggregateId,
        product_id: ProductId,
        reference: &str,
        quantity: i64,
        on_hand: i64,
    ) -> Result<Vec<ReservationEvent>, StockError> {
        if quantity <= 0 {
            return Err(StockError::InvalidQuantity("Quantity must be positive"));
        }
        let requested = u32::try_from(quantity)
            .map_err(|_| StockError::InvalidQuantity("Quantity is too large"))?;

        let existing = self.hold_for(reference);
        if existing == Some(requested) {
            return Ok(Vec::new());
        }

        let available = on_hand - self.held() + existing.map_or(0, i64::from);
        if quantity > available {
            return Err(StockError::InsufficientAvailability {
                product_id,
                requested,
                available,
            });
        }

        let mut events = Vec::with_capacity(2);
        if self.id.is_none() {
            events.push(ReservationEvent::ReservationBookOpened {
                book_id,
                product_id,
            });
        }
        events.push(ReservationEvent::HoldPlaced {
            reference: reference.to_string(),
            quantity: requested,
            placed_at: Utc::now(),
        });
        Ok(events)
    }

    /// Releases the hold for `reference`; unknown references are a no-op.
    pub fn release_hold(&self, reference: &str) -> Vec<ReservationEvent> {
        match self.holds.get(reference) {
            Some(quantity) => vec![ReservationEvent::HoldReleased {
                reference: reference.to_string(),
                quantity: *quantity,
                released_at: Utc::now(),
            }],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> (ProductReservations, AggregateId) {
        (ProductReservations::default(), AggregateId::new())
    }

    #[test]
    fn first_hold_opens_the_book() {
        let (mut reservations, id) = book();
        let events = reservations
            .place_hold(id, ProductId::new(5), "Order-1", 3, 10)
            .unwrap();
        assert_eq!(events.len(), 2);

        reservations.apply_events(events);
        assert_eq!(reservations.id(), Some(id));
        assert_eq!(reservations.held(), 3);
    }

    #[test]
    fn holds_reduce_availability() {
        let (mut reservations, id) = book();
        let events = reservations
            .place_hold(id, ProductId::new(5), "Order-1", 7, 10)
            .unwrap();
        reservations.apply_events(events);

        let err = reservations
            .place_hold(id, ProductId::new(5), "Order-2", 4, 10)
            .unwrap_err();
        assert!(matches!(
            err,
            StockError::InsufficientAvailability { available: 3, requested: 4, .. }
        ));
    }

    #[test]
    fn repeated_reference_is_idempotent() {
        let (mut reservations, id) = book();
        let events = reservations
            .place_hold(id, ProductId::new(5), "Order-1", 2, 10)
            .unwrap();
        reservations.apply_events(events);

        let again = reservations
            .place_hold(id, ProductId::new(5), "Order-1", 2, 10)
            .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn hold_can_grow_within_availability_and_shrink() {
        let (mut reservations, id) = book();
        for (reference, quantity) in [("Order-1", 4), ("Order-2", 3)] {
            let events = reservations
                .place_hold(id, ProductId::new(5), reference, quantity, 10)
                .unwrap();
            reservations.apply_events(events);
        }

        let grown = reservations
            .place_hold(id, ProductId::new(5), "Order-1", 7, 10)
            .unwrap();
        assert_eq!(grown.len(), 1);
        reservations.apply_events(grown);
        assert_eq!(reservations.hold_for("Order-1"), Some(7));
        assert_eq!(reservations.held(), 10);

        let err = reservations
            .place_hold(id, ProductId::new(5), "Order-1", 8, 10)
            .unwrap_err();
        assert!(matches!(
            err,
            StockError::InsufficientAvailability { available: 7, requested: 8, .. }
        ));

        let events = reservations
            .place_hold(id, ProductId::new(5), "Order-1", 2, 10)
            .unwrap();
        reservations.apply_events(events);
        assert_eq!(reservations.held(), 5);
    }

    #[test]
    fn release_restores_availability_once() {
        let (mut reservations, id) = book();
        let events = reservations
            .place_hold(id, ProductId::new(5), "Order-1", 10, 10)
            .unwrap();
        reservations.apply_events(events);

        let released = reservations.release_hold("Order-1");
        assert_eq!(released.len(), 1);
        reservations.apply_events(released);
        assert_eq!(reservations.held(), 0);
        assert!(reservations.release_hold("Order-1").is_empty());
    }
}
