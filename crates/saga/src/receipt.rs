//! Purchase-order receipts: record on the order, then stock in.

use std::time::Duration;

use common::AggregateId;
use domain::{PurchaseOrderService, ReceiptOutcome};
use event_store::EventStore;
use uuid::Uuid;

use crate::error::SagaError;
use crate::services::{DEFAULT_CALL_TIMEOUT, InventoryClient, with_timeout};

/// Receives goods against a purchase order line.
///
/// The receipt is recorded on the purchase order first, which validates
/// status and quantity and derives the new status. Inventory is then
/// asked to add the stock under the order number. Only once that succeeds
/// are the status change and the received item published. If the call
/// fails, declines or times out, the receipt is reverted, nothing is
/// published and the error is returned.
pub struct PurchaseOrderReceiving<S, I>
where
    S: EventStore,
    I: InventoryClient,
{
    purchase_orders: PurchaseOrderService<S>,
    inventory: I,
    call_timeout: Duration,
}

impl<S, I> PurchaseOrderReceiving<S, I>
where
    S: EventStore,
    I: InventoryClient,
{
    pub fn new(purchase_orders: PurchaseOrderService<S>, inventory: I) -> Self {
        Self {
            purchase_orders,
            inventory,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn purchase_orders(&self) -> &PurchaseOrderService<S> {
        &self.purchase_orders
    }

    #[tracing::instrument(skip(self))]
    pub async fn receive(
        &self,
        purchase_order_id: AggregateId,
        line_id: Uuid,
        quantity: i64,
    ) -> Result<ReceiptOutcome, SagaError> {
        let outcome = self
            .purchase_orders
            .record_receipt(purchase_order_id, line_id, quantity)
            .await?;
        let reference = outcome.purchase_order.order_number().to_string();
        let product_id = outcome.line.product_id;

        let stocked = with_timeout(
            "add_stock",
            self.call_timeout,
            self.inventory
                .add_stock(product_id, outcome.quantity, &reference),
        )
        .await;

        let failure = match stocked {
            Ok(true) => None,
            Ok(false) => Some(SagaError::StockInRejected {
                product_id,
                reference: reference.clone(),
            }),
            Err(err) => Some(err),
        };

        if let Some(err) = failure {
            metrics::counter!("purchase_order_receipts_total", "outcome" => "reverted").increment(1);
            tracing::warn!(%purchase_order_id, %line_id, error = %err, "stock-in failed, reverting receipt");
            if let Err(revert_err) = self
                .purchase_orders
                .revert_receipt(purchase_order_id, line_id, outcome.quantity, &err.to_string())
                .await
            {
                tracing::error!(
                    %purchase_order_id,
                    %line_id,
                    error = %revert_err,
                    "receipt could not be reverted; purchase order overstates received quantity"
                );
            }
            return Err(err);
        }

        metrics::counter!("purchase_order_receipts_total", "outcome" => "received").increment(1);
        self.purchase_orders.publish_receipt(&outcome).await;
        tracing::info!(
            %purchase_order_id,
            %product_id,
            quantity = outcome.quantity,
            status = %outcome.purchase_order.status(),
            "purchase order item received"
        );
        Ok(outcome)
    }
}
