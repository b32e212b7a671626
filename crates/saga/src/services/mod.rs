//! Collaborators the sagas call across a service boundary.

pub mod catalog;
pub mod inventory;

use std::future::Future;
use std::time::Duration;

use crate::error::SagaError;

pub use catalog::{InMemoryProductCatalog, ProductCatalog, ProductSnapshot};
pub use inventory::{InMemoryInventoryClient, InventoryCall, InventoryClient, LocalInventoryClient};

/// Default bound on a single remote call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs a remote call, turning an overrun into [`SagaError::Timeout`].
///
/// The call is dropped on timeout; whatever it did remotely before that
/// point is not undone here.
pub async fn with_timeout<T, F>(operation: &'static str, limit: Duration, call: F) -> Result<T, SagaError>
where
    F: Future<Output = Result<T, SagaError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "remote call timed out");
            metrics::counter!("remote_call_timeouts_total", "operation" => operation).increment(1);
            Err(SagaError::Timeout {
                operation,
                after: limit,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_calls_time_out() {
        let result: Result<(), SagaError> = with_timeout("lookup", Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(SagaError::Timeout { operation: "lookup", .. })));
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let value = with_timeout("lookup", Duration::from_secs(1), async { Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
