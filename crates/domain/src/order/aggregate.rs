//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AggregateId, ProductId};
use event_store::Version;
use serde::Serialize;

use crate::aggregate::Aggregate;
use crate::money::Money;

use super::{
    Address, OrderError, OrderEvent, OrderLine, OrderStatus,
    events::{OrderPlacedData, StatusChangedData},
};

/// A customer order.
///
/// `total_amount` is derived: it is recomputed in `apply` after every line
/// event and has no setter.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Order {
    id: Option<AggregateId>,
    #[serde(skip)]
    version: Version,
    customer_ref: String,
    shipping_address: Address,
    billing_address: Address,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    total_amount: Money,
    order_date: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
}

impl Aggregate for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            OrderEvent::OrderPlaced(data) => {
                self.id = Some(data.order_id);
                self.customer_ref = data.customer_ref;
                self.shipping_address = data.shipping_address;
                self.billing_address = data.billing_address;
                self.order_date = Some(data.placed_at);
                self.status = OrderStatus::Pending;
                for line in data.lines {
                    self.merge_line(line);
                }
                self.recompute_total();
            }
            OrderEvent::LineAdded(line) => {
                self.merge_line(line);
                self.recompute_total();
            }
            OrderEvent::LineRemoved { product_id } => {
                self.lines.retain(|line| line.product_id != product_id);
                self.recompute_total();
            }
            OrderEvent::AddressesUpdated {
                shipping_address,
                billing_address,
            } => {
                self.shipping_address = shipping_address;
                self.billing_address = billing_address;
            }
            OrderEvent::StatusChanged(data) => {
                self.status = data.to;
                match data.to {
                    OrderStatus::Shipped => self.shipped_at = Some(data.changed_at),
                    OrderStatus::Delivered => self.delivered_at = Some(data.changed_at),
                    _ => {}
                }
            }
        }
    }
}

// Queries
impl Order {
    pub fn customer_ref(&self) -> &str {
        &self.customer_ref
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn line(&self, product_id: ProductId) -> Option<&OrderLine> {
        self.lines.iter().find(|line| line.product_id == product_id)
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn shipping_address(&self) -> &Address {
        &self.shipping_address
    }

    pub fn billing_address(&self) -> &Address {
        &self.billing_address
    }

    pub fn order_date(&self) -> Option<DateTime<Utc>> {
        self.order_date
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }
}

// Commands
impl Order {
    pub fn place(
        &self,
        order_id: AggregateId,
        customer_ref: String,
        shipping_address: Address,
        billing_address: Address,
        lines: Vec<OrderLine>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.id.is_some() {
            return Err(OrderError::AlreadyExists(order_id));
        }
        if customer_ref.trim().is_empty() {
            return Err(OrderError::CustomerRequired);
        }
        if lines.is_empty() {
            return Err(OrderError::EmptyOrder);
        }
        validate_address(&shipping_address)?;
        validate_address(&billing_address)?;
        for line in &lines {
            validate_line(line)?;
        }
        check_merge(&[], &lines)?;

        Ok(vec![OrderEvent::OrderPlaced(OrderPlacedData {
            order_id,
            customer_ref,
            shipping_address,
            billing_address,
            lines,
            placed_at: Utc::now(),
        })])
    }

    pub fn add_line(&self, line: OrderLine) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_created()?;
        if !self.status.lines_editable() {
            return Err(OrderError::LinesLocked(self.status));
        }
        validate_line(&line)?;
        check_merge(&self.lines, std::slice::from_ref(&line))?;
        Ok(vec![OrderEvent::LineAdded(line)])
    }

    pub fn remove_line(&self, product_id: ProductId) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_created()?;
        if !self.status.lines_editable() {
            return Err(OrderError::LinesLocked(self.status));
        }
        if self.line(product_id).is_none() {
            return Err(OrderError::LineNotFound(product_id));
        }
        Ok(vec![OrderEvent::LineRemoved { product_id }])
    }

    pub fn update_addresses(
        &self,
        shipping_address: Address,
        billing_address: Address,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_created()?;
        if !self.status.addresses_editable() {
            return Err(OrderError::AddressesLocked(self.status));
        }
        validate_address(&shipping_address)?;
        validate_address(&billing_address)?;
        Ok(vec![OrderEvent::AddressesUpdated {
            shipping_address,
            billing_address,
        }])
    }

    /// Moves to `to` if the lifecycle table allows it; same status is a no-op.
    pub fn change_status(&self, to: OrderStatus) -> Result<Vec<OrderEvent>, OrderError> {
        self.require_created()?;
        if self.status == to {
            return Ok(Vec::new());
        }
        if !self.status.can_transition_to(to) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(vec![OrderEvent::StatusChanged(StatusChangedData {
            from: self.status,
            to,
            changed_at: Utc::now(),
        })])
    }

    fn require_created(&self) -> Result<AggregateId, OrderError> {
        self.id.ok_or(OrderError::Uninitialized)
    }
}

// Event application helpers
impl Order {
    fn merge_line(&mut self, line: OrderLine) {
        match self
            .lines
            .iter_mut()
            .find(|existing| existing.product_id == line.product_id)
        {
            Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
            None => self.lines.push(line),
        }
    }

    fn recompute_total(&mut self) {
        self.total_amount = self.lines.iter().map(OrderLine::line_total).sum();
    }
}

fn validate_line(line: &OrderLine) -> Result<(), OrderError> {
    if line.quantity == 0 {
        return Err(OrderError::InvalidQuantity {
            product_id: line.product_id,
        });
    }
    if line.unit_price.is_negative() {
        return Err(OrderError::InvalidPrice {
            product_id: line.product_id,
        });
    }
    Ok(())
}

/// Rejects `added` when merging it into `existing` would overflow a line
/// quantity or the order total. Merged lines keep the existing unit price,
/// as `merge_line` does.
fn check_merge(existing: &[OrderLine], added: &[OrderLine]) -> Result<(), OrderError> {
    let mut merged: Vec<(ProductId, Money, u32)> = existing
        .iter()
        .map(|line| (line.product_id, line.unit_price, line.quantity))
        .collect();
    for line in added {
        let too_large = OrderError::AmountTooLarge {
            product_id: line.product_id,
        };
        match merged.iter_mut().find(|(product_id, _, _)| *product_id == line.product_id) {
            Some((_, _, quantity)) => {
                *quantity = quantity.checked_add(line.quantity).ok_or(too_large)?;
            }
            None => merged.push((line.product_id, line.unit_price, line.quantity)),
        }
    }

    merged
        .iter()
        .try_fold(Money::ZERO, |total, (product_id, price, quantity)| {
            price
                .checked_times(*quantity)
                .and_then(|line_total| total.checked_add(line_total))
                .ok_or(OrderError::AmountTooLarge {
                    product_id: *product_id,
                })
        })
        .map(|_| ())
}

fn validate_address(address: &Address) -> Result<(), OrderError> {
    if address.is_complete() {
        Ok(())
    } else {
        Err(OrderError::IncompleteAddress)
    }
}
