use std::sync::Arc;

use chrono::Utc;
use common::{AggregateId, ProductId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::order::OrderPlacedData;
use domain::{
    Address, Aggregate, DomainEvent, Money, NoopPublisher, Order, OrderEvent, OrderLine,
    OrderService, OrderStatus, PlaceOrder,
};
use event_store::{AppendOptions, EventEnvelope, EventStore, InMemoryEventStore, Version};

fn address() -> Address {
    Address::new("1 Dock Road", "Rotterdam", "3011", "NL")
}

fn place_cmd() -> PlaceOrder {
    PlaceOrder::new(
        "customer-bench",
        address(),
        address(),
        vec![OrderLine::new(ProductId::new(1), "Widget", Money::from_cents(1000), 2)],
    )
}

fn envelope(aggregate_id: AggregateId, version: i64, event: &OrderEvent) -> EventEnvelope {
    EventEnvelope::builder()
        .aggregate_id(aggregate_id)
        .aggregate_type("Order")
        .event_type(event.event_type())
        .version(Version::new(version))
        .payload(event)
        .unwrap()
        .build()
        .unwrap()
}

fn bench_place_order(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = OrderService::new(InMemoryEventStore::new(), Arc::new(NoopPublisher));

    c.bench_function("domain/place_order", |b| {
        b.iter(|| rt.block_on(async { service.place(place_cmd()).await.unwrap() }));
    });
}

fn bench_status_cycle(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let service = OrderService::new(InMemoryEventStore::new(), Arc::new(NoopPublisher));

    c.bench_function("domain/place_through_delivered", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order = service.place(place_cmd()).await.unwrap();
                let id = order.id().unwrap();
                for status in [
                    OrderStatus::Confirmed,
                    OrderStatus::Processing,
                    OrderStatus::Shipped,
                    OrderStatus::Delivered,
                ] {
                    service.update_status(id, status).await.unwrap();
                }
            });
        });
    });
}

fn bench_reconstruct(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryEventStore::new();
    let order_id = AggregateId::new();

    rt.block_on(async {
        let placed = OrderEvent::OrderPlaced(OrderPlacedData {
            order_id,
            customer_ref: "customer-bench".into(),
            shipping_address: address(),
            billing_address: address(),
            lines: vec![OrderLine::new(ProductId::new(1), "Widget", Money::from_cents(100), 1)],
            placed_at: Utc::now(),
        });
        let mut envelopes = vec![envelope(order_id, 1, &placed)];
        for v in 2..=100 {
            let line = OrderLine::new(
                ProductId::new(v),
                format!("Product {v}"),
                Money::from_cents(100 * v),
                1,
            );
            envelopes.push(envelope(order_id, v, &OrderEvent::LineAdded(line)));
        }
        store.append(envelopes, AppendOptions::new()).await.unwrap();
    });

    c.bench_function("domain/reconstruct_100_events", |b| {
        b.iter(|| {
            rt.block_on(async {
                let envelopes = store.get_events_for_aggregate(order_id).await.unwrap();
                let mut order = Order::default();
                for envelope in &envelopes {
                    order.apply(envelope.decode::<OrderEvent>().unwrap());
                }
                order
            })
        });
    });
}

criterion_group!(benches, bench_place_order, bench_status_cycle, bench_reconstruct);
criterion_main!(benches);
