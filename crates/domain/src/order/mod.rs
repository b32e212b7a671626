//! Customer orders and their lifecycle.

mod aggregate;
mod commands;
mod events;
mod service;
mod status;
mod value_objects;

pub use aggregate::Order;
pub use commands::PlaceOrder;
pub use events::{OrderEvent, OrderPlacedData, StatusChangedData};
pub use service::OrderService;
pub use status::{ORDER_TRANSITIONS, OrderStatus};
pub use value_objects::{Address, OrderLine};

use common::{AggregateId, ProductId};
use thiserror::Error;

use crate::error::ErrorKind;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order {0} not found")]
    NotFound(AggregateId),

    #[error("Order {0} already exists")]
    AlreadyExists(AggregateId),

    #[error("Order has not been placed")]
    Uninitialized,

    #[error("Customer reference is required")]
    CustomerRequired,

    #[error("Order must contain at least one line")]
    EmptyOrder,

    #[error("Quantity for product {product_id} must be positive")]
    InvalidQuantity { product_id: ProductId },

    #[error("Unit price for product {product_id} cannot be negative")]
    InvalidPrice { product_id: ProductId },

    #[error("Quantity or total for product {product_id} is too large")]
    AmountTooLarge { product_id: ProductId },

    #[error("Address requires a street and a city")]
    IncompleteAddress,

    #[error("Product {0} is not on this order")]
    LineNotFound(ProductId),

    #[error("Order lines can only be changed while Pending (order is {0})")]
    LinesLocked(OrderStatus),

    #[error("Addresses can only be changed while Pending or Confirmed (order is {0})")]
    AddressesLocked(OrderStatus),

    #[error("Cannot transition order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::NotFound(_) | OrderError::Uninitialized | OrderError::LineNotFound(_) => {
                ErrorKind::NotFound
            }
            OrderError::AlreadyExists(_) => ErrorKind::Conflict,
            OrderError::CustomerRequired
            | OrderError::EmptyOrder
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidPrice { .. }
            | OrderError::AmountTooLarge { .. }
            | OrderError::IncompleteAddress => ErrorKind::Validation,
            OrderError::LinesLocked(_) | OrderError::AddressesLocked(_) => {
                ErrorKind::InvalidOperation
            }
            OrderError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        }
    }
}
