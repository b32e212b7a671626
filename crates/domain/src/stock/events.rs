use chrono::{DateTime, Utc};
use common::{AggregateId, LocationId, ProductId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::StockTransaction;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum StockEvent {
    StockRecordCreated(StockRecordCreatedData),
    /// Carries the full ledger entry; applying it is the quantity change.
    TransactionRecorded(StockTransaction),
}

impl DomainEvent for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::StockRecordCreated(_) => "StockRecordCreated",
            StockEvent::TransactionRecorded(_) => "TransactionRecorded",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecordCreatedData {
    pub stock_id: AggregateId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ReservationEvent {
    ReservationBookOpened {
        book_id: AggregateId,
        product_id: ProductId,
    },
    HoldPlaced {
        reference: String,
        quantity: u32,
        placed_at: DateTime<Utc>,
    },
    HoldReleased {
        reference: String,
        quantity: u32,
        released_at: DateTime<Utc>,
    },
}

impl DomainEvent for ReservationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReservationEvent::ReservationBookOpened { .. } => "ReservationBookOpened",
            ReservationEvent::HoldPlaced { .. } => "HoldPlaced",
            ReservationEvent::HoldReleased { .. } => "HoldReleased",
        }
    }
}
