use serde::{Deserialize, Serialize};

use crate::AggregateId;

/// Correlation string attached to ledger transactions and reservation holds.
///
/// Reservations made for an order use `Order-{id}`; stock received against a
/// purchase order carries the purchase-order number verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reference(String);

impl Reference {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Reference used by every reservation and release made for an order.
    pub fn order(order_id: AggregateId) -> Self {
        Self(format!("Order-{order_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Reference {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Reference {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn order_reference_format() {
        let uuid = Uuid::parse_str("6f1c2a44-1b0e-4c55-9a57-3f7a7d2c9e10").unwrap();
        let reference = Reference::order(AggregateId::from_uuid(uuid));
        assert_eq!(reference.as_str(), "Order-6f1c2a44-1b0e-4c55-9a57-3f7a7d2c9e10");
    }
}
