//! The reservation saga: places and cancels orders against inventory.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use common::{AggregateId, ProductId, Reference};
use domain::{
    Address, Aggregate, DomainError, DomainEvent, Order, OrderError, OrderLine, OrderService,
    OrderStatus, PlaceOrder,
};
use event_store::{AppendOptions, EventEnvelope, EventStore, Version};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::aggregate::ReservationSagaInstance;
use crate::error::SagaError;
use crate::events::{SagaEvent, SagaKind};
use crate::services::{DEFAULT_CALL_TIMEOUT, InventoryClient, ProductCatalog, with_timeout};

/// A line as the customer asked for it, before catalog lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub customer_ref: String,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub lines: Vec<RequestedLine>,
}

#[derive(Debug)]
pub struct PlacedOrder {
    pub order: Order,
    pub saga_id: AggregateId,
}

#[derive(Debug)]
pub struct CancelledOrder {
    pub order: Order,
    pub saga_id: AggregateId,
    pub released: usize,
    /// Set when the token stopped the run before every line was released.
    pub interrupted: bool,
}

/// Coordinates an order with inventory without a shared transaction.
///
/// Placement validates every line first (catalog, then availability) and
/// only then persists the order and reserves line by line under the
/// reference `Order-{id}`. A reservation failure part-way leaves earlier
/// holds in place and names the failing product.
///
/// Line edits keep the hold for a product equal to the quantity on the
/// order: adding a line grows it, removing one releases it.
///
/// Cancellation moves the order to Cancelled and releases each line with
/// the same reference. Each placement and cancellation run is logged to its
/// own event stream.
pub struct ReservationSaga<S, C, I>
where
    S: EventStore,
    C: ProductCatalog,
    I: InventoryClient,
{
    store: S,
    orders: OrderService<S>,
    catalog: C,
    inventory: I,
    call_timeout: Duration,
}

impl<S, C, I> ReservationSaga<S, C, I>
where
    S: EventStore + Clone,
    C: ProductCatalog,
    I: InventoryClient,
{
    pub fn new(store: S, orders: OrderService<S>, catalog: C, inventory: I) -> Self {
        Self {
            store,
            orders,
            catalog,
            inventory,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn orders(&self) -> &OrderService<S> {
        &self.orders
    }

    #[tracing::instrument(skip(self, request), fields(lines = request.lines.len()))]
    pub async fn place_order(&self, request: PlaceOrderRequest) -> Result<PlacedOrder, SagaError> {
        metrics::counter!("reservation_saga_started_total", "kind" => SagaKind::Reserve.as_str())
            .increment(1);
        let started = Instant::now();

        let requested = merge_lines(&request.lines)?;
        let mut lines = Vec::with_capacity(requested.len());
        for (&product_id, &quantity) in &requested {
            let product = with_timeout(
                "get_product",
                self.call_timeout,
                self.catalog.get_product(product_id),
            )
            .await?
            .ok_or(SagaError::ProductNotFound(product_id))?;

            let available = with_timeout(
                "check_availability",
                self.call_timeout,
                self.inventory.check_availability(product_id, quantity),
            )
            .await?;
            if !available {
                tracing::info!(%product_id, quantity, "order rejected for insufficient stock");
                return Err(SagaError::InsufficientStock {
                    product_id,
                    requested: quantity,
                });
            }
            lines.push(OrderLine::new(product_id, product.name, product.price, quantity));
        }

        let cmd = PlaceOrder::new(
            request.customer_ref,
            request.shipping_address,
            request.billing_address,
            lines,
        );
        let order_id = cmd.order_id;
        let order = self.orders.place(cmd).await?;
        let reference = Reference::order(order_id);

        let saga_id = AggregateId::new();
        let mut log = SagaLog::new(&self.store, saga_id);
        log.record(SagaEvent::saga_started(
            saga_id,
            order_id,
            SagaKind::Reserve,
            reference.as_str(),
            order.lines().len(),
        ))
        .await?;

        for line in order.lines() {
            let reserved = with_timeout(
                "reserve",
                self.call_timeout,
                self.inventory
                    .reserve(line.product_id, line.quantity, reference.as_str()),
            )
            .await;

            match reserved {
                Ok(()) => {
                    log.record(SagaEvent::line_reserved(line.product_id, line.quantity))
                        .await?;
                }
                Err(err) => {
                    tracing::warn!(
                        %order_id,
                        product_id = %line.product_id,
                        error = %err,
                        "reservation failed part-way; earlier holds are kept"
                    );
                    log.record(SagaEvent::line_reservation_failed(
                        line.product_id,
                        line.quantity,
                        err.to_string(),
                    ))
                    .await?;
                    log.record(SagaEvent::failed(err.to_string())).await?;
                    self.finish("failed", SagaKind::Reserve, started);
                    return Err(SagaError::ReservationFailed {
                        product_id: line.product_id,
                        source: Box::new(err),
                    });
                }
            }
        }

        log.record(SagaEvent::completed()).await?;
        self.finish("completed", SagaKind::Reserve, started);
        tracing::info!(%order_id, %saga_id, "order placed and reserved");
        Ok(PlacedOrder { order, saga_id })
    }

    /// Adds `quantity` of a product at its catalog price and grows the
    /// order's hold on that product to match.
    ///
    /// The hold is resized before the order is written; if the write fails
    /// the hold is put back to what it was.
    #[tracing::instrument(skip(self))]
    pub async fn add_line(
        &self,
        order_id: AggregateId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Order, SagaError> {
        let order = self.orders.get_order(order_id).await?;
        let product = with_timeout(
            "get_product",
            self.call_timeout,
            self.catalog.get_product(product_id),
        )
        .await?
        .ok_or(SagaError::ProductNotFound(product_id))?;

        let line = OrderLine::new(product_id, product.name, product.price, quantity);
        order.add_line(line.clone()).map_err(DomainError::from)?;
        let held = order.line(product_id).map_or(0, |existing| existing.quantity);
        let total = held
            .checked_add(quantity)
            .ok_or_else(|| DomainError::from(OrderError::AmountTooLarge { product_id }))?;

        let available = with_timeout(
            "check_availability",
            self.call_timeout,
            self.inventory.check_availability(product_id, quantity),
        )
        .await?;
        if !available {
            tracing::info!(%product_id, quantity, "line rejected for insufficient stock");
            return Err(SagaError::InsufficientStock {
                product_id,
                requested: quantity,
            });
        }

        let reference = Reference::order(order_id);
        with_timeout(
            "reserve",
            self.call_timeout,
            self.inventory.reserve(product_id, total, reference.as_str()),
        )
        .await?;

        match self.orders.add_line(order_id, line).await {
            Ok(order) => {
                tracing::info!(%order_id, %product_id, held = total, "line added and reserved");
                Ok(order)
            }
            Err(err) => {
                let restored = if held > 0 {
                    with_timeout(
                        "reserve",
                        self.call_timeout,
                        self.inventory.reserve(product_id, held, reference.as_str()),
                    )
                    .await
                } else {
                    with_timeout(
                        "release",
                        self.call_timeout,
                        self.inventory.release(product_id, total, reference.as_str()),
                    )
                    .await
                };
                if let Err(restore_err) = restored {
                    tracing::error!(
                        %order_id,
                        %product_id,
                        error = %restore_err,
                        "hold could not be restored after a failed line add"
                    );
                }
                Err(err.into())
            }
        }
    }

    /// Removes a product's line from the order and releases its hold.
    ///
    /// The order is updated first. A release that then fails is reported
    /// as [`SagaError::ReleaseIncomplete`]; the line stays removed.
    #[tracing::instrument(skip(self))]
    pub async fn remove_line(
        &self,
        order_id: AggregateId,
        product_id: ProductId,
    ) -> Result<Order, SagaError> {
        let existing = self.orders.get_order(order_id).await?;
        existing.remove_line(product_id).map_err(DomainError::from)?;
        let quantity = existing.line(product_id).map_or(0, |line| line.quantity);

        let order = self.orders.remove_line(order_id, product_id).await?;
        let reference = Reference::order(order_id);
        let released = with_timeout(
            "release",
            self.call_timeout,
            self.inventory.release(product_id, quantity, reference.as_str()),
        )
        .await;
        if let Err(err) = released {
            tracing::error!(%order_id, %product_id, error = %err, "release failed after line removal");
            return Err(SagaError::ReleaseIncomplete {
                failed: vec![product_id],
            });
        }

        tracing::info!(%order_id, %product_id, quantity, "line removed and released");
        Ok(order)
    }

    /// Cancels the order, then releases its holds one line at a time.
    ///
    /// `token` is checked before each release; a release already in
    /// flight always runs to completion.
    #[tracing::instrument(skip(self, token))]
    pub async fn cancel_order(
        &self,
        order_id: AggregateId,
        token: &CancellationToken,
    ) -> Result<CancelledOrder, SagaError> {
        metrics::counter!("reservation_saga_started_total", "kind" => SagaKind::Release.as_str())
            .increment(1);
        let started = Instant::now();

        let order = self
            .orders
            .update_status(order_id, OrderStatus::Cancelled)
            .await?;
        let reference = Reference::order(order_id);

        let saga_id = AggregateId::new();
        let mut log = SagaLog::new(&self.store, saga_id);
        log.record(SagaEvent::saga_started(
            saga_id,
            order_id,
            SagaKind::Release,
            reference.as_str(),
            order.lines().len(),
        ))
        .await?;

        let mut released = 0;
        let mut failed = Vec::new();
        for (index, line) in order.lines().iter().enumerate() {
            if token.is_cancelled() {
                let remaining = order.lines().len() - index;
                tracing::info!(%order_id, remaining, "release interrupted");
                log.record(SagaEvent::interrupted(remaining)).await?;
                self.finish("interrupted", SagaKind::Release, started);
                return Ok(CancelledOrder {
                    order,
                    saga_id,
                    released,
                    interrupted: true,
                });
            }

            let result = with_timeout(
                "release",
                self.call_timeout,
                self.inventory
                    .release(line.product_id, line.quantity, reference.as_str()),
            )
            .await;
            match result {
                Ok(()) => {
                    released += 1;
                    log.record(SagaEvent::line_released(line.product_id, line.quantity))
                        .await?;
                }
                Err(err) => {
                    tracing::error!(%order_id, product_id = %line.product_id, error = %err, "release failed");
                    log.record(SagaEvent::line_release_failed(
                        line.product_id,
                        line.quantity,
                        err.to_string(),
                    ))
                    .await?;
                    failed.push(line.product_id);
                }
            }
        }

        if !failed.is_empty() {
            log.record(SagaEvent::failed(format!("{} release(s) failed", failed.len())))
                .await?;
            self.finish("failed", SagaKind::Release, started);
            return Err(SagaError::ReleaseIncomplete { failed });
        }

        log.record(SagaEvent::completed()).await?;
        self.finish("completed", SagaKind::Release, started);
        Ok(CancelledOrder {
            order,
            saga_id,
            released,
            interrupted: false,
        })
    }

    pub async fn get_saga(&self, saga_id: AggregateId) -> Result<Option<ReservationSagaInstance>, SagaError> {
        let events = self.store.get_events_for_aggregate(saga_id).await?;
        if events.is_empty() {
            return Ok(None);
        }

        let mut saga = ReservationSagaInstance::default();
        for envelope in &events {
            saga.apply(envelope.decode::<SagaEvent>()?);
            saga.set_version(envelope.version);
        }
        Ok(Some(saga))
    }

    fn finish(&self, outcome: &'static str, kind: SagaKind, started: Instant) {
        metrics::counter!(
            "reservation_saga_finished_total",
            "kind" => kind.as_str(),
            "outcome" => outcome
        )
        .increment(1);
        metrics::histogram!("reservation_saga_duration_seconds", "kind" => kind.as_str())
            .record(started.elapsed().as_secs_f64());
    }
}

/// Sums quantities per product, keeping products in a stable order.
fn merge_lines(lines: &[RequestedLine]) -> Result<BTreeMap<ProductId, u32>, SagaError> {
    let mut merged = BTreeMap::new();
    for line in lines {
        let quantity = merged.entry(line.product_id).or_insert(0u32);
        *quantity = quantity.checked_add(line.quantity).ok_or_else(|| {
            DomainError::from(OrderError::AmountTooLarge {
                product_id: line.product_id,
            })
        })?;
    }
    Ok(merged)
}

/// Appends to one saga run's stream, tracking its version locally.
struct SagaLog<'a, S: EventStore> {
    store: &'a S,
    saga_id: AggregateId,
    version: Version,
}

impl<'a, S: EventStore> SagaLog<'a, S> {
    fn new(store: &'a S, saga_id: AggregateId) -> Self {
        Self {
            store,
            saga_id,
            version: Version::initial(),
        }
    }

    async fn record(&mut self, event: SagaEvent) -> Result<(), SagaError> {
        let envelope = EventEnvelope::builder()
            .event_type(event.event_type())
            .aggregate_id(self.saga_id)
            .aggregate_type(ReservationSagaInstance::aggregate_type())
            .version(self.version.next())
            .payload(&event)?
            .build()?;

        self.version = self
            .store
            .append(vec![envelope], AppendOptions::expect_version(self.version))
            .await?;
        Ok(())
    }
}
