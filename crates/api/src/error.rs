//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, ErrorKind};
use saga::SagaError;
use thiserror::Error;

/// Everything a handler can fail with.
///
/// Status codes come from [`ErrorKind`] alone. Internal failures are
/// logged in full and answered with a generic body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Saga(#[from] SagaError),
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) => ErrorKind::Validation,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Domain(err) => err.kind(),
            ApiError::Saga(err) => err.kind(),
        }
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.kind())
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict | ErrorKind::InvalidTransition => StatusCode::CONFLICT,
        ErrorKind::InsufficientStock
        | ErrorKind::InvalidOperation
        | ErrorKind::UnsupportedOperation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        let message = if kind == ErrorKind::Internal {
            tracing::error!(error = %self, "internal server error");
            "internal server error".to_string()
        } else {
            tracing::debug!(error = %self, ?kind, "request rejected");
            self.to_string()
        };

        let body = serde_json::json!({ "error": message, "kind": format!("{kind:?}") });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use common::AggregateId;
    use domain::{OrderError, OrderStatus, StockError, TransactionType};
    use event_store::EventStoreError;

    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        let cases = [
            (ApiError::from(DomainError::from(OrderError::NotFound(AggregateId::new()))), 404),
            (ApiError::BadRequest("bad id".into()), 400),
            (
                ApiError::from(DomainError::from(OrderError::InvalidTransition {
                    from: OrderStatus::Delivered,
                    to: OrderStatus::Pending,
                })),
                409,
            ),
            (
                ApiError::from(DomainError::from(StockError::InsufficientStock { current: 2 })),
                422,
            ),
            (
                ApiError::from(DomainError::from(StockError::UnsupportedTransaction(
                    TransactionType::Transfer,
                ))),
                422,
            ),
            (
                ApiError::from(DomainError::from(EventStoreError::InvalidAppend("empty batch".into()))),
                500,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status().as_u16(), expected, "{err}");
        }
    }
}
