//! Order service: the command surface over the order aggregate.

use std::sync::Arc;

use common::{AggregateId, ProductId};
use event_store::EventStore;

use crate::command::CommandHandler;
use crate::error::DomainError;
use crate::publisher::{EventPublisher, publish_json, topics};

use super::{Address, Order, OrderError, OrderEvent, OrderLine, OrderStatus, PlaceOrder};

pub struct OrderService<S: EventStore> {
    handler: CommandHandler<S, Order>,
    publisher: Arc<dyn EventPublisher>,
}

impl<S: EventStore> OrderService<S> {
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

    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    /// Persists a new Pending order and publishes `order.created`.
    #[tracing::instrument(skip(self, cmd), fields(order_id = %cmd.order_id, lines = cmd.lines.len()))]
    pub async fn place(&self, cmd: PlaceOrder) -> Result<Order, DomainError> {
        let PlaceOrder {
            order_id,
            customer_ref,
            shipping_address,
            billing_address,
            lines,
        } = cmd;

        let result = self
            .handler
            .create(order_id, Vec::new(), |order| {
                order.place(order_id, customer_ref, shipping_address, billing_address, lines)
            })
            .await?;

        tracing::info!(total = %result.aggregate.total_amount(), "order placed");
        publish_json(&*self.publisher, topics::ORDER_CREATED, &result.aggregate).await;
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self, line), fields(product_id = %line.product_id))]
    pub async fn add_line(&self, order_id: AggregateId, line: OrderLine) -> Result<Order, DomainError> {
        let result = self
            .handler
            .execute_with_retry(order_id, |order| order.add_line(line.clone()))
            .await
            .map_err(|e| missing_as_not_found(e, order_id))?;
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_line(
        &self,
        order_id: AggregateId,
        product_id: ProductId,
    ) -> Result<Order, DomainError> {
        let result = self
            .handler
            .execute_with_retry(order_id, |order| order.remove_line(product_id))
            .await
            .map_err(|e| missing_as_not_found(e, order_id))?;
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self, shipping_address, billing_address))]
    pub async fn update_addresses(
        &self,
        order_id: AggregateId,
        shipping_address: Address,
        billing_address: Address,
    ) -> Result<Order, DomainError> {
        let result = self
            .handler
            .execute_with_retry(order_id, |order| {
                order.update_addresses(shipping_address.clone(), billing_address.clone())
            })
            .await
            .map_err(|e| missing_as_not_found(e, order_id))?;
        Ok(result.aggregate)
    }

    /// Applies a lifecycle transition and publishes `order.status.changed`
    /// when the status actually moved.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: AggregateId,
        status: OrderStatus,
    ) -> Result<Order, DomainError> {
        let result = self
            .handler
            .execute_with_retry(order_id, |order| order.change_status(status))
            .await
            .map_err(|e| missing_as_not_found(e, order_id))?;

        for event in &result.events {
            if let OrderEvent::StatusChanged(change) = event {
                tracing::info!(from = %change.from, to = %change.to, "order status changed");
                metrics::counter!("order_status_changes_total", "to" => change.to.as_str())
                    .increment(1);
                let payload = serde_json::json!({
                    "orderId": order_id,
                    "from": change.from,
                    "to": change.to,
                    "changedAt": change.changed_at,
                });
                self.publisher
                    .publish(topics::ORDER_STATUS_CHANGED, payload)
                    .await;
            }
        }
        Ok(result.aggregate)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: AggregateId) -> Result<Order, DomainError> {
        self.handler
            .load_existing(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(order_id).into())
    }
}

fn missing_as_not_found(err: DomainError, order_id: AggregateId) -> DomainError {
    match err {
        DomainError::Order(OrderError::Uninitialized) => OrderError::NotFound(order_id).into(),
        other => other,
    }
}
