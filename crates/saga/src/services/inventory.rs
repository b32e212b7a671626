//! Inventory client trait, the in-process adapter and a scripted double.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use common::ProductId;
use event_store::EventStore;
use inventory::InventoryService;
use tokio_util::sync::CancellationToken;

use crate::error::SagaError;

/// The inventory operations order and purchase-order flows depend on.
///
/// Every mutating call carries a reference so a repeated call is harmless.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    async fn check_availability(&self, product_id: ProductId, quantity: u32) -> Result<bool, SagaError>;

    /// Sets the hold for `reference` to `quantity`, growing or shrinking an
    /// existing one.
    async fn reserve(&self, product_id: ProductId, quantity: u32, reference: &str) -> Result<(), SagaError>;

    async fn release(&self, product_id: ProductId, quantity: u32, reference: &str) -> Result<(), SagaError>;

    /// `Ok(false)` means inventory declined without raising an error.
    async fn add_stock(&self, product_id: ProductId, quantity: u32, reference: &str) -> Result<bool, SagaError>;
}

/// Calls an [`InventoryService`] running in the same process.
pub struct LocalInventoryClient<S: EventStore + Clone> {
    service: Arc<InventoryService<S>>,
}

impl<S: EventStore + Clone> LocalInventoryClient<S> {
    pub fn new(service: Arc<InventoryService<S>>) -> Self {
        Self { service }
    }
}

impl<S: EventStore + Clone> Clone for LocalInventoryClient<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

#[async_trait]
impl<S: EventStore + Clone + 'static> InventoryClient for LocalInventoryClient<S> {
    async fn check_availability(&self, product_id: ProductId, quantity: u32) -> Result<bool, SagaError> {
        Ok(self
            .service
            .check_availability(product_id, i64::from(quantity))
            .await?)
    }

    async fn reserve(&self, product_id: ProductId, quantity: u32, reference: &str) -> Result<(), SagaError> {
        Ok(self
            .service
            .reserve(product_id, i64::from(quantity), reference)
            .await?)
    }

    async fn release(&self, product_id: ProductId, quantity: u32, reference: &str) -> Result<(), SagaError> {
        Ok(self
            .service
            .release(product_id, i64::from(quantity), reference)
            .await?)
    }

    async fn add_stock(&self, product_id: ProductId, quantity: u32, reference: &str) -> Result<bool, SagaError> {
        self.service
            .add_stock(product_id, i64::from(quantity), reference)
            .await?;
        Ok(true)
    }
}

/// One call as the in-memory client saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InventoryCall {
    CheckAvailability { product_id: ProductId, quantity: u32 },
    Reserve { product_id: ProductId, quantity: u32, reference: String },
    Release { product_id: ProductId, quantity: u32, reference: String },
    AddStock { product_id: ProductId, quantity: u32, reference: String },
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    stock: HashMap<ProductId, i64>,
    holds: HashMap<(ProductId, String), u32>,
    calls: Vec<InventoryCall>,
    fail_reserve_for: HashSet<ProductId>,
    fail_release_for: HashSet<ProductId>,
    fail_add_stock: bool,
    decline_add_stock: bool,
    latency: Option<Duration>,
    cancel_after_releases: Option<(usize, CancellationToken)>,
}

impl InMemoryInventoryState {
    fn available(&self, product_id: ProductId) -> i64 {
        let on_hand = self.stock.get(&product_id).copied().unwrap_or_default();
        let held: i64 = self
            .holds
            .iter()
            .filter(|((product, _), _)| *product == product_id)
            .map(|(_, quantity)| i64::from(*quantity))
            .sum();
        on_hand - held
    }
}

/// Scripted inventory for tests and the dev server: records every call
/// and can be told to fail, decline, or stall.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryClient {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stock(self, product_id: ProductId, quantity: i64) -> Self {
        self.state().stock.insert(product_id, quantity);
        self
    }

    pub fn set_fail_reserve_for(&self, product_id: ProductId) {
        self.state().fail_reserve_for.insert(product_id);
    }

    pub fn set_fail_release_for(&self, product_id: ProductId) {
        self.state().fail_release_for.insert(product_id);
    }

    pub fn set_fail_add_stock(&self, fail: bool) {
        self.state().fail_add_stock = fail;
    }

    pub fn set_decline_add_stock(&self, decline: bool) {
        self.state().decline_add_stock = decline;
    }

    pub fn set_latency(&self, latency: Option<Duration>) {
        self.state().latency = latency;
    }

    /// Cancels `token` once `releases` release calls have completed.
    pub fn cancel_after_releases(&self, releases: usize, token: CancellationToken) {
        self.state().cancel_after_releases = Some((releases, token));
    }

    pub fn calls(&self) -> Vec<InventoryCall> {
        self.state().calls.clone()
    }

    pub fn reserve_calls(&self) -> usize {
        self.count_calls(|call| matches!(call, InventoryCall::Reserve { .. }))
    }

    pub fn release_calls(&self) -> usize {
        self.count_calls(|call| matches!(call, InventoryCall::Release { .. }))
    }

    pub fn stock(&self, product_id: ProductId) -> i64 {
        self.state().stock.get(&product_id).copied().unwrap_or_default()
    }

    pub fn hold(&self, product_id: ProductId, reference: &str) -> Option<u32> {
        self.state()
            .holds
            .get(&(product_id, reference.to_string()))
            .copied()
    }

    fn count_calls(&self, predicate: impl Fn(&InventoryCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(call)).count()
    }

    fn state(&self) -> RwLockWriteGuard<'_, InMemoryInventoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn stall(&self) {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl InventoryClient for InMemoryInventoryClient {
    async fn check_availability(&self, product_id: ProductId, quantity: u32) -> Result<bool, SagaError> {
        self.stall().await;
        let mut state = self.state();
        state.calls.push(InventoryCall::CheckAvailability {
            product_id,
            quantity,
        });
        Ok(state.available(product_id) >= i64::from(quantity))
    }

    async fn reserve(&self, product_id: ProductId, quantity: u32, reference: &str) -> Result<(), SagaError> {
        self.stall().await;
        let mut state = self.state();
        state.calls.push(InventoryCall::Reserve {
            product_id,
            quantity,
            reference: reference.to_string(),
        });
        if state.fail_reserve_for.contains(&product_id) {
            return Err(SagaError::Remote {
                operation: "reserve",
                reason: format!("inventory unavailable for product {product_id}"),
            });
        }
        let key = (product_id, reference.to_string());
        let existing = state.holds.get(&key).copied();
        if existing == Some(quantity) {
            return Ok(());
        }
        let available = state.available(product_id) + existing.map_or(0, i64::from);
        if available < i64::from(quantity) {
            return Err(SagaError::InsufficientStock {
                product_id,
                requested: quantity,
            });
        }
        state.holds.insert(key, quantity);
        Ok(())
    }

    async fn release(&self, product_id: ProductId, quantity: u32, reference: &str) -> Result<(), SagaError> {
        self.stall().await;
        let mut state = self.state();
        state.calls.push(InventoryCall::Release {
            product_id,
            quantity,
            reference: reference.to_string(),
        });
        let result = if state.fail_release_for.contains(&product_id) {
            Err(SagaError::Remote {
                operation: "release",
                reason: format!("inventory unavailable for product {product_id}"),
            })
        } else {
            state.holds.remove(&(product_id, reference.to_string()));
            Ok(())
        };

        let releases = state
            .calls
            .iter()
            .filter(|call| matches!(call, InventoryCall::Release { .. }))
            .count();
        if let Some((after, token)) = &state.cancel_after_releases {
            if releases >= *after {
                token.cancel();
            }
        }
        result
    }

    async fn add_stock(&self, product_id: ProductId, quantity: u32, reference: &str) -> Result<bool, SagaError> {
        self.stall().await;
        let mut state = self.state();
        state.calls.push(InventoryCall::AddStock {
            product_id,
            quantity,
            reference: reference.to_string(),
        });
        if state.fail_add_stock {
            return Err(SagaError::Remote {
                operation: "add_stock",
                reason: "inventory unavailable".to_string(),
            });
        }
        if state.decline_add_stock {
            return Ok(false);
        }
        *state.stock.entry(product_id).or_default() += i64::from(quantity);
        Ok(true)
    }
}
