//! Order command payloads.

use common::AggregateId;
use serde::{Deserialize, Serialize};

use super::{Address, OrderLine};

/// Everything needed to persist a new order.
///
/// Line names and prices must already be resolved against the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: AggregateId,
    pub customer_ref: String,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub lines: Vec<OrderLine>,
}

impl PlaceOrder {
    pub fn new(
        customer_ref: impl Into<String>,
        shipping_address: Address,
        billing_address: Address,
        lines: Vec<OrderLine>,
    ) -> Self {
        Self {
            order_id: AggregateId::new(),
            customer_ref: customer_ref.into(),
            shipping_address,
            billing_address,
            lines,
        }
    }
}
