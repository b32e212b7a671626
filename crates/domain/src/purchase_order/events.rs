use chrono::{DateTime, Utc};
use common::{AggregateId, ProductId, SupplierId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::DomainEvent;
use crate::money::Money;

use super::{PurchaseOrderLine, PurchaseOrderStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreatedData),
    LineAdded(PurchaseOrderLine),
    LineUpdated {
        line_id: Uuid,
        quantity_ordered: u32,
        unit_price: Money,
    },
    LineRemoved {
        line_id: Uuid,
    },
    DetailsUpdated {
        expected_delivery_date: Option<DateTime<Utc>>,
        notes: Option<String>,
    },
    StatusChanged {
        from: PurchaseOrderStatus,
        to: PurchaseOrderStatus,
        changed_at: DateTime<Utc>,
    },
    ItemReceived(ItemReceivedData),
    /// Compensates an `ItemReceived` whose stock-in never happened.
    ReceiptReverted {
        line_id: Uuid,
        quantity: u32,
        reason: String,
        reverted_at: DateTime<Utc>,
    },
}

impl DomainEvent for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "PurchaseOrderCreated",
            PurchaseOrderEvent::LineAdded(_) => "PurchaseOrderLineAdded",
            PurchaseOrderEvent::LineUpdated { .. } => "PurchaseOrderLineUpdated",
            PurchaseOrderEvent::LineRemoved { .. } => "PurchaseOrderLineRemoved",
            PurchaseOrderEvent::DetailsUpdated { .. } => "PurchaseOrderDetailsUpdated",
            PurchaseOrderEvent::StatusChanged { .. } => "PurchaseOrderStatusChanged",
            PurchaseOrderEvent::ItemReceived(_) => "PurchaseOrderItemReceived",
            PurchaseOrderEvent::ReceiptReverted { .. } => "PurchaseOrderReceiptReverted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderCreatedData {
    pub purchase_order_id: AggregateId,
    pub order_number: String,
    pub supplier_id: SupplierId,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReceivedData {
    pub line_id: Uuid,
    pub product_id: ProductId,
    pub quantity: u32,
    pub received_at: DateTime<Utc>,
}
