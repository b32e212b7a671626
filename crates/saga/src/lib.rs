//! Cross-service workflows between orders, purchase orders and inventory.
//!
//! - [`ReservationSaga`] places orders after validating every line against
//!   the catalog and inventory, then reserves per line; cancellation
//!   releases per line under the same reference.
//! - [`PurchaseOrderReceiving`] records a receipt and stocks the goods in,
//!   reverting the receipt if inventory does not take them.
//!
//! Neither runs inside a shared transaction. Steps are idempotent by
//! reference so a repeated call is safe.

pub mod aggregate;
pub mod error;
pub mod events;
pub mod receipt;
pub mod reservation;
pub mod services;
pub mod state;

pub use aggregate::ReservationSagaInstance;
pub use error::SagaError;
pub use events::{SagaEvent, SagaKind};
pub use receipt::PurchaseOrderReceiving;
pub use reservation::{CancelledOrder, PlaceOrderRequest, PlacedOrder, RequestedLine, ReservationSaga};
pub use services::{
    InMemoryInventoryClient, InMemoryProductCatalog, InventoryCall, InventoryClient,
    LocalInventoryClient, ProductCatalog, ProductSnapshot, with_timeout,
};
pub use state::SagaState;
pub use tokio_util::sync::CancellationToken;
