//! Supplier replenishment orders and the receipt flow's domain half.

mod aggregate;
mod events;
mod line;
mod service;
mod status;

pub use aggregate::PurchaseOrder;
pub use events::{ItemReceivedData, PurchaseOrderCreatedData, PurchaseOrderEvent};
pub use line::{NewPurchaseOrderLine, PurchaseOrderLine};
pub use service::{CreatePurchaseOrder, PurchaseOrderService, ReceiptOutcome};
pub use status::{PURCHASE_ORDER_TRANSITIONS, PurchaseOrderStatus};

use common::AggregateId;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ErrorKind;

/// Unique-key scope holding order numbers.
pub const ORDER_NUMBER_KEY_SCOPE: &str = "purchase_order_number";

#[derive(Debug, Error)]
pub enum PurchaseOrderError {
    #[error("Purchase order {0} not found")]
    NotFound(AggregateId),

    #[error("Purchase order {0} already exists")]
    AlreadyExists(AggregateId),

    #[error("Purchase order has not been created")]
    Uninitialized,

    #[error("Purchase order number {0} is already in use")]
    DuplicateOrderNumber(String),

    #[error("Order number is required")]
    OrderNumberRequired,

    #[error("Quantity must be positive")]
    InvalidQuantity,

    #[error("Unit price cannot be negative")]
    InvalidPrice,

    #[error("Purchase order total is too large")]
    TotalTooLarge,

    #[error("Line {0} is not on this purchase order")]
    LineNotFound(Uuid),

    #[error("Purchase order lines can only be changed while Draft (status is {0})")]
    LinesLocked(PurchaseOrderStatus),

    #[error("Purchase order is {0} and can no longer be changed")]
    Closed(PurchaseOrderStatus),

    #[error("A purchase order needs at least one line before it can be submitted")]
    NoLines,

    #[error("{0} is derived from receipts and cannot be set directly")]
    NotCallerSettable(PurchaseOrderStatus),

    #[error("Cannot transition purchase order from {from} to {to}")]
    InvalidTransition {
        from: PurchaseOrderStatus,
        to: PurchaseOrderStatus,
    },

    #[error("Cannot receive items for a purchase order in {0} status")]
    NotReceivable(PurchaseOrderStatus),

    #[error(
        "Cannot receive {requested} units on line {line_id}: only {outstanding} outstanding"
    )]
    OverReceipt {
        line_id: Uuid,
        outstanding: u32,
        requested: i64,
    },
}

impl PurchaseOrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PurchaseOrderError::NotFound(_)
            | PurchaseOrderError::Uninitialized
            | PurchaseOrderError::LineNotFound(_) => ErrorKind::NotFound,
            PurchaseOrderError::AlreadyExists(_) | PurchaseOrderError::DuplicateOrderNumber(_) => {
                ErrorKind::Conflict
            }
            PurchaseOrderError::OrderNumberRequired
            | PurchaseOrderError::InvalidQuantity
            | PurchaseOrderError::InvalidPrice
            | PurchaseOrderError::TotalTooLarge
            | PurchaseOrderError::NoLines => ErrorKind::Validation,
            PurchaseOrderError::LinesLocked(_)
            | PurchaseOrderError::Closed(_)
            | PurchaseOrderError::NotCallerSettable(_)
            | PurchaseOrderError::NotReceivable(_) => ErrorKind::InvalidOperation,
            PurchaseOrderError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            PurchaseOrderError::OverReceipt { .. } => ErrorKind::InsufficientStock,
        }
    }
}
