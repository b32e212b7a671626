//! Command surface over the purchase order aggregate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{AggregateId, SupplierId};
use event_store::{EventStore, EventStoreError, UniqueKey};
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::command::CommandHandler;
use crate::error::DomainError;
use crate::money::Money;
use crate::publisher::{EventPublisher, publish_json, topics};

use super::{
    NewPurchaseOrderLine, ORDER_NUMBER_KEY_SCOPE, PurchaseOrder, PurchaseOrderError,
    PurchaseOrderEvent, PurchaseOrderLine, PurchaseOrderStatus,
};

#[derive(Debug, Clone)]
pub struct CreatePurchaseOrder {
    pub purchase_order_id: AggregateId,
    pub order_number: String,
    pub supplier_id: SupplierId,
    pub expected_delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub lines: Vec<NewPurchaseOrderLine>,
}

impl CreatePurchaseOrder {
    pub fn new(
        order_number: impl Into<String>,
        supplier_id: SupplierId,
        lines: Vec<NewPurchaseOrderLine>,
    ) -> Self {
        Self {
            purchase_order_id: AggregateId::new(),
            order_number: order_number.into(),
            supplier_id,
            expected_delivery_date: None,
            notes: None,
            lines,
        }
    }
}

/// A receipt that has been recorded on the purchase order.
#[derive(Debug, Clone)]
pub struct ReceiptOutcome {
    pub purchase_order: PurchaseOrder,
    pub line: PurchaseOrderLine,
    pub quantity: u32,
    pub previous_status: PurchaseOrderStatus,
}

pub struct PurchaseOrderService<S: EventStore> {
    handler: CommandHandler<S, PurchaseOrder>,
    publisher: Arc<dyn EventPublisher>,
}

impl<S: EventStore> PurchaseOrderService<S> {
    pub fn new(store: S, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            handler: CommandHandler::new(store),
            publisher,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.handler = self.handler.with_max_retries(max_retries);
        self
    }

    /// Creates a Draft purchase order. The order number is claimed in the
    /// same write, so two creates racing on one number cannot both land.
    #[tracing::instrument(skip(self, cmd), fields(order_number = %cmd.order_number))]
    pub async fn create(&self, cmd: CreatePurchaseOrder) -> Result<PurchaseOrder, DomainError> {
        let CreatePurchaseOrder {
            purchase_order_id,
            order_number,
            supplier_id,
            expected_delivery_date,
            notes,
            lines,
        } = cmd;

        let key = UniqueKey::new(ORDER_NUMBER_KEY_SCOPE, order_number.trim());
        let result = self
            .handler
            .create(purchase_order_id, vec![key], |po| {
                po.create(
                    purchase_order_id,
                    order_number.clone(),
                    supplier_id,
                    expected_delivery_date,
                    notes,
                    lines,
                )
            })
            .await
            .map_err(|err| match err {
                DomainError::EventStore(EventStoreError::DuplicateKey { key, .. }) => {
                    PurchaseOrderError::DuplicateOrderNumber(key).into()
                }
                other => other,
            })?;

        tracing::info!(%purchase_order_id, "purchase order created");
        publish_json(&*self.publisher, topics::PURCHASE_ORDER_CREATED, &result.aggregate).await;
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self, line))]
    pub async fn add_line(
        &self,
        id: AggregateId,
        line: NewPurchaseOrderLine,
    ) -> Result<PurchaseOrder, DomainError> {
        self.update(id, |po| po.add_line(line.clone())).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_line(
        &self,
        id: AggregateId,
        line_id: Uuid,
        quantity: u32,
        unit_price: Money,
    ) -> Result<PurchaseOrder, DomainError> {
        self.update(id, |po| po.update_line(line_id, quantity, unit_price))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_line(&self, id: AggregateId, line_id: Uuid) -> Result<PurchaseOrder, DomainError> {
        self.update(id, |po| po.remove_line(line_id)).await
    }

    #[tracing::instrument(skip(self, notes))]
    pub async fn update_details(
        &self,
        id: AggregateId,
        expected_delivery_date: Option<DateTime<Utc>>,
        notes: Option<String>,
    ) -> Result<PurchaseOrder, DomainError> {
        self.update(id, |po| po.update_details(expected_delivery_date, notes.clone()))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn change_status(
        &self,
        id: AggregateId,
        status: PurchaseOrderStatus,
    ) -> Result<PurchaseOrder, DomainError> {
        let result = self
            .handler
            .execute_with_retry(id, |po| po.change_status(status))
            .await
            .map_err(|e| missing_as_not_found(e, id))?;

        for event in &result.events {
            if let PurchaseOrderEvent::StatusChanged { from, to, changed_at } = event {
                tracing::info!(%from, %to, "purchase order status changed");
                self.publish_status(&result.aggregate, id, *from, *to, *changed_at)
                    .await;
            }
        }
        Ok(result.aggregate)
    }

    /// Records a receipt on one line and re-derives the status.
    ///
    /// This only touches the purchase order and publishes nothing. Putting
    /// the goods on the shelf is the caller's job:
    /// [`revert_receipt`](Self::revert_receipt) undoes this step if that
    /// fails, and [`publish_receipt`](Self::publish_receipt) announces it
    /// once it succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn record_receipt(
        &self,
        id: AggregateId,
        line_id: Uuid,
        quantity: i64,
    ) -> Result<ReceiptOutcome, DomainError> {
        let before = self.get(id).await?;
        let result = self
            .handler
            .execute_with_retry(id, |po| po.receive(line_id, quantity))
            .await
            .map_err(|e| missing_as_not_found(e, id))?;

        let received = result.events.iter().find_map(|event| match event {
            PurchaseOrderEvent::ItemReceived(data) => Some(data.quantity),
            _ => None,
        });
        let line = result
            .aggregate
            .line(line_id)
            .cloned()
            .ok_or(PurchaseOrderError::LineNotFound(line_id))?;

        Ok(ReceiptOutcome {
            purchase_order: result.aggregate,
            line,
            quantity: received.unwrap_or_default(),
            previous_status: before.status(),
        })
    }

    /// Announces a completed receipt: the status change first when the
    /// receipt moved it, then the item itself.
    pub async fn publish_receipt(&self, outcome: &ReceiptOutcome) {
        let po = &outcome.purchase_order;
        let Some(id) = po.id() else {
            return;
        };
        if po.status() != outcome.previous_status {
            self.publish_status(po, id, outcome.previous_status, po.status(), Utc::now())
                .await;
        }
        let payload = serde_json::json!({
            "purchaseOrderId": id,
            "orderNumber": po.order_number(),
            "lineId": outcome.line.line_id,
            "productId": outcome.line.product_id,
            "quantity": outcome.quantity,
            "quantityReceived": outcome.line.quantity_received,
            "status": po.status(),
        });
        self.publisher
            .publish(topics::PURCHASE_ORDER_ITEM_RECEIVED, payload)
            .await;
    }

    #[tracing::instrument(skip(self, reason))]
    pub async fn revert_receipt(
        &self,
        id: AggregateId,
        line_id: Uuid,
        quantity: u32,
        reason: &str,
    ) -> Result<PurchaseOrder, DomainError> {
        let result = self
            .handler
            .execute_with_retry(id, |po| po.revert_receipt(line_id, quantity, reason))
            .await
            .map_err(|e| missing_as_not_found(e, id))?;
        tracing::warn!(%line_id, quantity, reason, "purchase order receipt reverted");
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: AggregateId) -> Result<PurchaseOrder, DomainError> {
        self.handler
            .load_existing(id)
            .await?
            .ok_or_else(|| PurchaseOrderError::NotFound(id).into())
    }

    pub async fn find_by_number(&self, order_number: &str) -> Result<Option<PurchaseOrder>, DomainError> {
        let key = UniqueKey::new(ORDER_NUMBER_KEY_SCOPE, order_number.trim());
        match self.handler.store().resolve_key(&key).await? {
            Some(id) => self.handler.load_existing(id).await,
            None => Ok(None),
        }
    }

    async fn update<F>(&self, id: AggregateId, decide: F) -> Result<PurchaseOrder, DomainError>
    where
        F: Fn(&PurchaseOrder) -> Result<Vec<PurchaseOrderEvent>, PurchaseOrderError>,
    {
        let result = self
            .handler
            .execute_with_retry(id, decide)
            .await
            .map_err(|e| missing_as_not_found(e, id))?;
        if !result.events.is_empty() {
            publish_json(&*self.publisher, topics::PURCHASE_ORDER_UPDATED, &result.aggregate).await;
        }
        Ok(result.aggregate)
    }

    async fn publish_status(
        &self,
        po: &PurchaseOrder,
        id: AggregateId,
        from: PurchaseOrderStatus,
        to: PurchaseOrderStatus,
        changed_at: DateTime<Utc>,
    ) {
        let payload = serde_json::json!({
            "purchaseOrderId": id,
            "orderNumber": po.order_number(),
            "from": from,
            "to": to,
            "changedAt": changed_at,
        });
        self.publisher
            .publish(topics::PURCHASE_ORDER_STATUS_UPDATED, payload)
            .await;
        if to == PurchaseOrderStatus::Cancelled {
            publish_json(&*self.publisher, topics::PURCHASE_ORDER_CANCELLED, po).await;
        }
    }
}

fn missing_as_not_found(err: DomainError, id: AggregateId) -> DomainError {
    match err {
        DomainError::PurchaseOrder(PurchaseOrderError::Uninitialized) => {
            PurchaseOrderError::NotFound(id).into()
        }
        other => other,
    }
}
