//! Saga run lifecycle.

use serde::{Deserialize, Serialize};

/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          ├──► Failed
///                          └──► Interrupted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    #[default]
    NotStarted,
    Running,
    Completed,
    /// A step failed; steps already done were not undone.
    Failed,
    /// Stopped by its cancellation token between two calls.
    Interrupted,
}

impl SagaState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Completed | SagaState::Failed | SagaState::Interrupted
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running => "Running",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
            SagaState::Interrupted => "Interrupted",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
