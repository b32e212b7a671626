use chrono::{DateTime, Utc};
use common::{AggregateId, SupplierId};
use event_store::Version;
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::money::Money;

use super::{
    NewPurchaseOrderLine, PurchaseOrderError, PurchaseOrderEvent, PurchaseOrderLine,
    PurchaseOrderStatus,
    events::{ItemReceivedData, PurchaseOrderCreatedData},
};

/// A replenishment order placed with a supplier.
///
/// Lines are editable only in Draft. Once Ordered, receipts drive the
/// status: `apply` re-derives PartiallyReceived/Completed from received
/// quantities after every receipt event.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PurchaseOrder {
    id: Option<AggregateId>,
    #[serde(skip)]
    version: Version,
    order_number: String,
    supplier_id: Option<SupplierId>,
    status: PurchaseOrderStatus,
    lines: Vec<PurchaseOrderLine>,
    total_amount: Money,
    expected_delivery_date: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for PurchaseOrder {
    type Event = PurchaseOrderEvent;
    type Error = PurchaseOrderError;

    fn aggregate_type() -> &'static str {
        "PurchaseOrder"
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
            PurchaseOrderEvent::PurchaseOrderCreated(data) => {
                self.id = Some(data.purchase_order_id);
                self.order_number = data.order_number;
                self.supplier_id = Some(data.supplier_id);
                self.expected_delivery_date = data.expected_delivery_date;
                self.notes = data.notes;
                self.status = PurchaseOrderStatus::Draft;
                self.created_at = Some(data.created_at);
                self.updated_at = Some(data.created_at);
            }
            PurchaseOrderEvent::LineAdded(line) => {
                self.lines.push(line);
                self.recompute_total();
            }
            PurchaseOrderEvent::LineUpdated {
                line_id,
                quantity_ordered,
                unit_price,
            } => {
                if let Some(line) = self.line_mut(line_id) {
                    line.quantity_ordered = quantity_ordered;
                    line.unit_price = unit_price;
                }
                self.recompute_total();
            }
            PurchaseOrderEvent::LineRemoved { line_id } => {
                self.lines.retain(|line| line.line_id != line_id);
                self.recompute_total();
            }
            PurchaseOrderEvent::DetailsUpdated {
                expected_delivery_date,
                notes,
            } => {
                self.expected_delivery_date = expected_delivery_date;
                self.notes = notes;
            }
            PurchaseOrderEvent::StatusChanged { to, changed_at, .. } => {
                self.status = to;
                self.updated_at = Some(changed_at);
            }
            PurchaseOrderEvent::ItemReceived(data) => {
                if let Some(line) = self.line_mut(data.line_id) {
                    line.quantity_received += data.quantity;
                }
                self.updated_at = Some(data.received_at);
                self.derive_receipt_status();
            }
            PurchaseOrderEvent::ReceiptReverted {
                line_id,
                quantity,
                reverted_at,
                ..
            } => {
                if let Some(line) = self.line_mut(line_id) {
                    line.quantity_received = line.quantity_received.saturating_sub(quantity);
                }
                self.updated_at = Some(reverted_at);
                self.derive_receipt_status();
            }
        }
    }
}

// Queries
impl PurchaseOrder {
    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[PurchaseOrderLine] {
        &self.lines
    }

    pub fn line(&self, line_id: Uuid) -> Option<&PurchaseOrderLine> {
        self.lines.iter().find(|line| line.line_id == line_id)
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn expected_delivery_date(&self) -> Option<DateTime<Utc>> {
        self.expected_delivery_date
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

// Commands
impl PurchaseOrder {
    pub fn create(
        &self,
        purchase_order_id: AggregateId,
        order_number: String,
        supplier_id: SupplierId,
        expected_delivery_date: Option<DateTime<Utc>>,
        notes: Option<String>,
        lines: Vec<NewPurchaseOrderLine>,
    ) -> Result<Vec<PurchaseOrderEvent>, PurchaseOrderError> {
        if self.id.is_some() {
            return Err(PurchaseOrderError::AlreadyExists(purchase_order_id));
        }
        if order_number.trim().is_empty() {
            return Err(PurchaseOrderError::OrderNumberRequired);
        }
        checked_total(lines.iter().map(|line| (line.quantity, line.unit_price)))?;

        let mut events = vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreatedData {
                purchase_order_id,
                order_number,
                supplier_id,
                expected_delivery_date,
                notes,
                created_at: Utc::now(),
            },
        )];
        for line in lines {
            events.push(new_line_event(line)?);
        }
        Ok(events)
    }

    pub fn add_line(
        &self,
        line: NewPurchaseOrderLine,
    ) -> Result<Vec<PurchaseOrderEvent>, PurchaseOrderError> {
        self.require_draft()?;
        checked_total(
            self.lines
                .iter()
                .map(|existing| (existing.quantity_ordered, existing.unit_price))
                .chain([(line.quantity, line.unit_price)]),
        )?;
        Ok(vec![new_line_event(line)?])
    }

    pub fn update_line(
        &self,
        line_id: Uuid,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Vec<PurchaseOrderEvent>, PurchaseOrderError> {
        self.require_draft()?;
        self.line(line_id)
            .ok_or(PurchaseOrderError::LineNotFound(line_id))?;
        validate_line_values(quantity, unit_price)?;
        checked_total(self.lines.iter().map(|line| {
            if line.line_id == line_id {
                (quantity, unit_price)
            } else {
                (line.quantity_ordered, line.unit_price)
            }
        }))?;
        Ok(vec![PurchaseOrderEvent::LineUpdated {
            line_id,
            quantity_ordered: quantity,
            unit_price,
        }])
    }

    pub fn remove_line(&self, line_id: Uuid) -> Result<Vec<PurchaseOrderEvent>, PurchaseOrderError> {
        self.require_draft()?;
        self.line(line_id)
            .ok_or(PurchaseOrderError::LineNotFound(line_id))?;
        Ok(vec![PurchaseOrderEvent::LineRemoved { line_id }])
    }

    pub fn update_details(
        &self,
        expected_delivery_date: Option<DateTime<Utc>>,
        notes: Option<String>,
    ) -> Result<Vec<PurchaseOrderEvent>, PurchaseOrderError> {
        self.require_created()?;
        if self.status.is_closed() {
            return Err(PurchaseOrderError::Closed(self.status));
        }
        Ok(vec![PurchaseOrderEvent::DetailsUpdated {
            expected_delivery_date,
            notes,
        }])
    }

    /// Caller-requested transition. Receipt-derived statuses are refused
    /// and moving to the current status is a no-op.
    pub fn change_status(
        &self,
        to: PurchaseOrderStatus,
    ) -> Result<Vec<PurchaseOrderEvent>, PurchaseOrderError> {
        self.require_created()?;
        if !to.caller_settable() {
            return Err(PurchaseOrderError::NotCallerSettable(to));
        }
        if self.status == to {
            return Ok(Vec::new());
        }
        if !self.status.can_transition_to(to) {
            return Err(PurchaseOrderError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        if to == PurchaseOrderStatus::Submitted && self.lines.is_empty() {
            return Err(PurchaseOrderError::NoLines);
        }
        Ok(vec![PurchaseOrderEvent::StatusChanged {
            from: self.status,
            to,
            changed_at: Utc::now(),
        }])
    }

    pub fn receive(
        &self,
        line_id: Uuid,
        quantity: i64,
    ) -> Result<Vec<PurchaseOrderEvent>, PurchaseOrderError> {
        self.require_created()?;
        if !self.status.accepts_receipts() {
            return Err(PurchaseOrderError::NotReceivable(self.status));
        }
        if quantity <= 0 {
            return Err(PurchaseOrderError::InvalidQuantity);
        }
        let line = self
            .line(line_id)
            .ok_or(PurchaseOrderError::LineNotFound(line_id))?;
        let outstanding = i64::from(line.outstanding());
        if quantity > outstanding {
            return Err(PurchaseOrderError::OverReceipt {
                line_id,
                outstanding: line.outstanding(),
                requested: quantity,
            });
        }

        Ok(vec![PurchaseOrderEvent::ItemReceived(ItemReceivedData {
            line_id,
            product_id: line.product_id,
            quantity: u32::try_from(quantity).unwrap_or(line.outstanding()),
            received_at: Utc::now(),
        })])
    }

    pub fn revert_receipt(
        &self,
        line_id: Uuid,
        quantity: u32,
        reason: impl Into<String>,
    ) -> Result<Vec<PurchaseOrderEvent>, PurchaseOrderError> {
        let line = self
            .line(line_id)
            .ok_or(PurchaseOrderError::LineNotFound(line_id))?;
        let quantity = quantity.min(line.quantity_received);
        if quantity == 0 {
            return Ok(Vec::new());
        }
        Ok(vec![PurchaseOrderEvent::ReceiptReverted {
            line_id,
            quantity,
            reason: reason.into(),
            reverted_at: Utc::now(),
        }])
    }

    fn require_created(&self) -> Result<AggregateId, PurchaseOrderError> {
        self.id.ok_or(PurchaseOrderError::Uninitialized)
    }

    fn require_draft(&self) -> Result<(), PurchaseOrderError> {
        self.require_created()?;
        if self.status != PurchaseOrderStatus::Draft {
            return Err(PurchaseOrderError::LinesLocked(self.status));
        }
        Ok(())
    }
}

// Event application helpers
impl PurchaseOrder {
    fn line_mut(&mut self, line_id: Uuid) -> Option<&mut PurchaseOrderLine> {
        self.lines.iter_mut().find(|line| line.line_id == line_id)
    }

    fn recompute_total(&mut self) {
        self.total_amount = self.lines.iter().map(PurchaseOrderLine::line_total).sum();
    }

    fn derive_receipt_status(&mut self) {
        if !matches!(
            self.status,
            PurchaseOrderStatus::Ordered
                | PurchaseOrderStatus::PartiallyReceived
                | PurchaseOrderStatus::Completed
        ) {
            return;
        }
        self.status = if self.lines.iter().all(PurchaseOrderLine::is_fully_received) {
            PurchaseOrderStatus::Completed
        } else if self.lines.iter().any(|line| line.quantity_received > 0) {
            PurchaseOrderStatus::PartiallyReceived
        } else {
            PurchaseOrderStatus::Ordered
        };
    }
}

fn validate_line_values(quantity: u32, unit_price: Money) -> Result<(), PurchaseOrderError> {
    if quantity == 0 {
        return Err(PurchaseOrderError::InvalidQuantity);
    }
    if unit_price.is_negative() {
        return Err(PurchaseOrderError::InvalidPrice);
    }
    Ok(())
}

fn checked_total(
    lines: impl IntoIterator<Item = (u32, Money)>,
) -> Result<Money, PurchaseOrderError> {
    lines
        .into_iter()
        .try_fold(Money::ZERO, |total, (quantity, unit_price)| {
            unit_price
                .checked_times(quantity)
                .and_then(|line_total| total.checked_add(line_total))
        })
        .ok_or(PurchaseOrderError::TotalTooLarge)
}

fn new_line_event(line: NewPurchaseOrderLine) -> Result<PurchaseOrderEvent, PurchaseOrderError> {
    validate_line_values(line.quantity, line.unit_price)?;
    Ok(PurchaseOrderEvent::LineAdded(PurchaseOrderLine {
        line_id: Uuid::new_v4(),
        product_id: line.product_id,
        quantity_ordered: line.quantity,
        unit_price: line.unit_price,
        quantity_received: 0,
    }))
}
