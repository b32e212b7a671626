//! Saga error types.

use std::time::Duration;

use common::ProductId;
use domain::{DomainError, ErrorKind};
use event_store::EventStoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SagaError {
    #[error("Product {0} not found")]
    ProductNotFound(ProductId),

    #[error("Insufficient stock for product {product_id}: requested {requested}")]
    InsufficientStock { product_id: ProductId, requested: u32 },

    /// A hold failed part-way through an order. Holds placed for earlier
    /// lines are left in place.
    #[error("Reserving product {product_id} failed: {source}")]
    ReservationFailed {
        product_id: ProductId,
        #[source]
        source: Box<SagaError>,
    },

    #[error("Releasing holds failed for products {failed:?}")]
    ReleaseIncomplete { failed: Vec<ProductId> },

    #[error("Inventory refused to add stock for product {product_id} (reference {reference})")]
    StockInRejected {
        product_id: ProductId,
        reference: String,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Remote call {operation} failed: {reason}")]
    Remote {
        operation: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),
}

impl SagaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::ProductNotFound(_) => ErrorKind::NotFound,
            SagaError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            SagaError::ReservationFailed { source, .. } => source.kind(),
            SagaError::Domain(err) => err.kind(),
            SagaError::ReleaseIncomplete { .. }
            | SagaError::StockInRejected { .. }
            | SagaError::Timeout { .. }
            | SagaError::Remote { .. }
            | SagaError::EventStore(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, SagaError>;
