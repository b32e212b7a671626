//! Reservation saga instance aggregate.

use common::{AggregateId, ProductId};
use domain::Aggregate;
use event_store::Version;
use serde::Serialize;

use crate::error::SagaError;
use crate::events::{SagaEvent, SagaKind};
use crate::state::SagaState;

/// Audit record of one saga run, rebuilt from its own stream.
///
/// The saga never reads this back to decide anything; it exists so a
/// run that stopped half-way can be inspected afterwards.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReservationSagaInstance {
    id: Option<AggregateId>,
    #[serde(skip)]
    version: Version,
    order_id: Option<AggregateId>,
    kind: Option<SagaKind>,
    reference: String,
    state: SagaState,
    planned_lines: usize,
    completed_lines: Vec<ProductId>,
    failed_lines: Vec<ProductId>,
    failure_reason: Option<String>,
}

impl Aggregate for ReservationSagaInstance {
    type Event = SagaEvent;
    type Error = SagaError;

    fn aggregate_type() -> &'static str {
        "ReservationSaga"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            SagaEvent::SagaStarted(data) => {
                self.id = Some(data.saga_id);
                self.order_id = Some(data.order_id);
                self.kind = Some(data.kind);
                self.reference = data.reference;
                self.planned_lines = data.lines;
                self.state = SagaState::Running;
            }
            SagaEvent::LineReserved(line) | SagaEvent::LineReleased(line) => {
                self.completed_lines.push(line.product_id);
            }
            SagaEvent::LineReservationFailed(failure) | SagaEvent::LineReleaseFailed(failure) => {
                self.failed_lines.push(failure.product_id);
            }
            SagaEvent::SagaInterrupted { .. } => {
                self.state = SagaState::Interrupted;
            }
            SagaEvent::SagaCompleted { .. } => {
                self.state = SagaState::Completed;
            }
            SagaEvent::SagaFailed { reason, .. } => {
                self.state = SagaState::Failed;
                self.failure_reason = Some(reason);
            }
        }
    }
}

impl ReservationSagaInstance {
    pub fn state(&self) -> SagaState {
        self.state
    }

    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    pub fn kind(&self) -> Option<SagaKind> {
        self.kind
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn planned_lines(&self) -> usize {
        self.planned_lines
    }

    pub fn completed_lines(&self) -> &[ProductId] {
        &self.completed_lines
    }

    pub fn failed_lines(&self) -> &[ProductId] {
        &self.failed_lines
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }
}
