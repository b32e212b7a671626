//! Order domain events.

use chrono::{DateTime, Utc};
use common::{AggregateId, ProductId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{Address, OrderLine, OrderStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    OrderPlaced(OrderPlacedData),
    /// Merges into an existing line for the same product.
    LineAdded(OrderLine),
    LineRemoved { product_id: ProductId },
    AddressesUpdated {
        shipping_address: Address,
        billing_address: Address,
    },
    StatusChanged(StatusChangedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "OrderPlaced",
            OrderEvent::LineAdded(_) => "LineAdded",
            OrderEvent::LineRemoved { .. } => "LineRemoved",
            OrderEvent::AddressesUpdated { .. } => "AddressesUpdated",
            OrderEvent::StatusChanged(_) => "StatusChanged",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPlacedData {
    pub order_id: AggregateId,
    pub customer_ref: String,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub lines: Vec<OrderLine>,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed_at: DateTime<Utc>,
}
