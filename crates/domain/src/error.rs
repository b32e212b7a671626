//! Domain error types and their classification.

use event_store::EventStoreError;
use thiserror::Error;

use crate::order::OrderError;
use crate::purchase_order::PurchaseOrderError;
use crate::stock::StockError;

/// Caller-facing category of a failure.
///
/// Every error raised below the request boundary maps to exactly one kind;
/// the HTTP layer turns kinds into status codes without inspecting messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InsufficientStock,
    InvalidTransition,
    InvalidOperation,
    UnsupportedOperation,
    Validation,
    Internal,
}

#[derive(Debug, Error)]
pub enum DomainError {
    #[error(transparent)]
    Stock(#[from] StockError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    PurchaseOrder(#[from] PurchaseOrderError),

    /// Retries were exhausted while other writers kept moving the stream.
    #[error("{aggregate_type} {aggregate_id} was modified concurrently, please retry")]
    ContentionExhausted {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Stock(e) => e.kind(),
            DomainError::Order(e) => e.kind(),
            DomainError::PurchaseOrder(e) => e.kind(),
            DomainError::ContentionExhausted { .. } => ErrorKind::Conflict,
            DomainError::EventStore(EventStoreError::DuplicateKey { .. })
            | DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. }) => {
                ErrorKind::Conflict
            }
            DomainError::EventStore(_) | DomainError::Serialization(_) => ErrorKind::Internal,
        }
    }

    /// True when the failure came from a stale expected version.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. })
        )
    }
}
