use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    StockIn,
    StockOut,
    Adjustment,
    /// Declared for wire compatibility; every mutation path rejects it.
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::StockIn => "StockIn",
            TransactionType::StockOut => "StockOut",
            TransactionType::Adjustment => "Adjustment",
            TransactionType::Transfer => "Transfer",
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable ledger entry.
///
/// `quantity` is the signed effect on the record: positive for stock in,
/// negative for stock out, the delta for an adjustment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: Uuid,
    pub stock_id: AggregateId,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub quantity: i64,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StockTransaction {
    pub(crate) fn new(
        stock_id: AggregateId,
        kind: TransactionType,
        quantity: i64,
        reference: Option<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            stock_id,
            kind,
            quantity,
            reference,
            notes,
            timestamp: Utc::now(),
        }
    }
}

/// Quantity implied by a transaction history.
///
/// For any stock record this equals its current quantity; the ledger tests
/// assert it after every mutation sequence.
pub fn replay_quantity<'a>(transactions: impl IntoIterator<Item = &'a StockTransaction>) -> i64 {
    transactions.into_iter().map(|t| t.quantity).sum()
}
