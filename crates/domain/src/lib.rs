//! Domain layer: event-sourced aggregates for stock, customer orders and
//! purchase orders, plus the command handler that persists them.
//!
//! - [`Aggregate`] and [`DomainEvent`] define how state is folded from events
//! - [`CommandHandler`] runs load, decide, append with optimistic concurrency
//! - [`EventPublisher`] carries notifications out after each persisted change

pub mod aggregate;
pub mod command;
pub mod error;
pub mod money;
pub mod order;
pub mod publisher;
pub mod purchase_order;
pub mod stock;

pub use aggregate::{Aggregate, DomainEvent};
pub use command::{CommandHandler, CommandResult, DEFAULT_MAX_RETRIES};
pub use error::{DomainError, ErrorKind};
pub use money::Money;
pub use order::{Address, Order, OrderError, OrderEvent, OrderLine, OrderService, OrderStatus, PlaceOrder};
pub use publisher::{EventPublisher, InMemoryPublisher, NoopPublisher, PublishedEvent, topics};
pub use purchase_order::{
    CreatePurchaseOrder, NewPurchaseOrderLine, PURCHASE_ORDER_TRANSITIONS, PurchaseOrder,
    PurchaseOrderError, PurchaseOrderEvent, PurchaseOrderLine, PurchaseOrderService,
    PurchaseOrderStatus, ReceiptOutcome,
};
pub use stock::{
    ProductReservations, ReservationEvent, StockError, StockEvent, StockRecord, StockTransaction,
    TransactionType,
};
