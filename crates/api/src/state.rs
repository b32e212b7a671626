//! Shared application state.

use std::sync::Arc;

use domain::{InMemoryPublisher, OrderService, PurchaseOrderService};
use event_store::EventStore;
use inventory::InventoryService;
use saga::{InMemoryProductCatalog, LocalInventoryClient, PurchaseOrderReceiving, ReservationSaga};

use crate::config::Config;

pub type Reservations<S> = ReservationSaga<S, InMemoryProductCatalog, LocalInventoryClient<S>>;
pub type Receiving<S> = PurchaseOrderReceiving<S, LocalInventoryClient<S>>;

/// Services every handler can reach. All of them share one store and one
/// publisher.
pub struct AppState<S: EventStore + Clone + 'static> {
    pub store: S,
    pub inventory: Arc<InventoryService<S>>,
    pub reservations: Reservations<S>,
    pub receiving: Receiving<S>,
    pub catalog: InMemoryProductCatalog,
    pub publisher: InMemoryPublisher,
}

impl<S: EventStore + Clone + 'static> AppState<S> {
    /// Wires the services over `store`, applying the retry, timeout and
    /// receiving-location settings from `config`.
    pub fn new(store: S, catalog: InMemoryProductCatalog, config: &Config) -> Self {
        let publisher = InMemoryPublisher::with_history_limit(config.event_history_limit);
        let retries = config.command_max_retries;

        let inventory = Arc::new(
            InventoryService::new(store.clone(), Arc::new(publisher.clone()))
                .with_max_retries(retries)
                .with_receiving_location(config.receiving_location),
        );
        let client = LocalInventoryClient::new(Arc::clone(&inventory));

        let orders = OrderService::new(store.clone(), Arc::new(publisher.clone())).with_max_retries(retries);
        let reservations = ReservationSaga::new(store.clone(), orders, catalog.clone(), client.clone())
            .with_call_timeout(config.remote_call_timeout);

        let purchase_orders =
            PurchaseOrderService::new(store.clone(), Arc::new(publisher.clone())).with_max_retries(retries);
        let receiving =
            PurchaseOrderReceiving::new(purchase_orders, client).with_call_timeout(config.remote_call_timeout);

        Self {
            store,
            inventory,
            reservations,
            receiving,
            catalog,
            publisher,
        }
    }
}
