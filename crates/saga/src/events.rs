//! Events recorded on a reservation saga's own stream.

use chrono::{DateTime, Utc};
use common::{AggregateId, ProductId};
use domain::DomainEvent;
use serde::{Deserialize, Serialize};

/// Which direction a saga run moves holds in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SagaKind {
    /// Order placement: one hold per line.
    Reserve,
    /// Order cancellation: one release per line.
    Release,
}

impl SagaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaKind::Reserve => "reserve",
            SagaKind::Release => "release",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaEvent {
    SagaStarted(SagaStartedData),
    LineReserved(LineData),
    LineReservationFailed(LineFailedData),
    LineReleased(LineData),
    /// Logged and skipped; the remaining lines are still released.
    LineReleaseFailed(LineFailedData),
    SagaInterrupted { remaining: usize, interrupted_at: DateTime<Utc> },
    SagaCompleted { completed_at: DateTime<Utc> },
    SagaFailed { reason: String, failed_at: DateTime<Utc> },
}

impl DomainEvent for SagaEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SagaEvent::SagaStarted(_) => "SagaStarted",
            SagaEvent::LineReserved(_) => "LineReserved",
            SagaEvent::LineReservationFailed(_) => "LineReservationFailed",
            SagaEvent::LineReleased(_) => "LineReleased",
            SagaEvent::LineReleaseFailed(_) => "LineReleaseFailed",
            SagaEvent::SagaInterrupted { .. } => "SagaInterrupted",
            SagaEvent::SagaCompleted { .. } => "SagaCompleted",
            SagaEvent::SagaFailed { .. } => "SagaFailed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaStartedData {
    pub saga_id: AggregateId,
    pub order_id: AggregateId,
    pub kind: SagaKind,
    /// Correlation string every call of this run carries.
    pub reference: String,
    pub lines: usize,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineData {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineFailedData {
    pub product_id: ProductId,
    pub quantity: u32,
    pub error: String,
}

impl SagaEvent {
    pub fn saga_started(
        saga_id: AggregateId,
        order_id: AggregateId,
        kind: SagaKind,
        reference: impl Into<String>,
        lines: usize,
    ) -> Self {
        SagaEvent::SagaStarted(SagaStartedData {
            saga_id,
            order_id,
            kind,
            reference: reference.into(),
            lines,
            started_at: Utc::now(),
        })
    }

    pub fn line_reserved(product_id: ProductId, quantity: u32) -> Self {
        SagaEvent::LineReserved(LineData {
            product_id,
            quantity,
        })
    }

    pub fn line_released(product_id: ProductId, quantity: u32) -> Self {
        SagaEvent::LineReleased(LineData {
            product_id,
            quantity,
        })
    }

    pub fn line_reservation_failed(
        product_id: ProductId,
        quantity: u32,
        error: impl Into<String>,
    ) -> Self {
        SagaEvent::LineReservationFailed(LineFailedData {
            product_id,
            quantity,
            error: error.into(),
        })
    }

    pub fn line_release_failed(product_id: ProductId, quantity: u32, error: impl Into<String>) -> Self {
        SagaEvent::LineReleaseFailed(LineFailedData {
            product_id,
            quantity,
            error: error.into(),
        })
    }

    pub fn interrupted(remaining: usize) -> Self {
        SagaEvent::SagaInterrupted {
            remaining,
            interrupted_at: Utc::now(),
        }
    }

    pub fn completed() -> Self {
        SagaEvent::SagaCompleted {
            completed_at: Utc::now(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        SagaEvent::SagaFailed {
            reason: reason.into(),
            failed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let event = SagaEvent::line_reservation_failed(ProductId::new(2), 3, "timed out");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "LineReservationFailed");
        assert_eq!(json["data"]["product_id"], 2);

        let back: SagaEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type(), "LineReservationFailed");
    }
}
