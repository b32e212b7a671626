//! Stock ledger aggregates: per-location stock records and per-product
//! reservation books.

mod events;
mod record;
mod reservation;
mod transaction;

pub use events::{ReservationEvent, StockEvent, StockRecordCreatedData};
pub use record::StockRecord;
pub use reservation::{ProductReservations, RESERVATIONS_KEY_SCOPE};
pub use transaction::{StockTransaction, TransactionType, replay_quantity};

use common::{AggregateId, LocationId, ProductId};
use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum StockError {
    #[error("Stock record {0} not found")]
    NotFound(AggregateId),

    #[error("Stock record has not been created")]
    Uninitialized,

    #[error("Stock record already exists for product {product_id} at location {location_id}")]
    AlreadyExists {
        product_id: ProductId,
        location_id: LocationId,
    },

    #[error("{0}")]
    InvalidQuantity(&'static str),

    #[error("Not enough stock available. Current quantity: {current}")]
    InsufficientStock { current: u32 },

    /// A reservation asked for more than is unreserved across all locations.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientAvailability {
        product_id: ProductId,
        requested: u32,
        available: i64,
    },

    #[error("{0} transactions are not supported")]
    UnsupportedTransaction(TransactionType),
}

impl StockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StockError::NotFound(_) | StockError::Uninitialized => ErrorKind::NotFound,
            StockError::AlreadyExists { .. } => ErrorKind::Conflict,
            StockError::InvalidQuantity(_) => ErrorKind::Validation,
            StockError::InsufficientStock { .. } | StockError::InsufficientAvailability { .. } => {
                ErrorKind::InsufficientStock
            }
            StockError::UnsupportedTransaction(_) => ErrorKind::UnsupportedOperation,
        }
    }
}
