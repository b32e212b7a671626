use common::ProductId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Money;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub line_id: Uuid,
    pub product_id: ProductId,
    pub quantity_ordered: u32,
    pub unit_price: Money,
    pub quantity_received: u32,
}

impl PurchaseOrderLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.times(self.quantity_ordered)
    }

    pub fn outstanding(&self) -> u32 {
        self.quantity_ordered.saturating_sub(self.quantity_received)
    }

    pub fn is_fully_received(&self) -> bool {
        self.quantity_received >= self.quantity_ordered
    }
}

/// Line as supplied by a caller, before an id is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseOrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl NewPurchaseOrderLine {
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }
}
