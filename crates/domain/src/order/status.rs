//! Order lifecycle.

use serde::{Deserialize, Serialize};

/// Where an order is in its lifecycle.
///
/// ```text
/// Pending ──► Confirmed ──► Processing ──► Shipped ──► Delivered ──► Returned
///    │            │             │
///    └────────────┴─────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Returned,
}

/// Every permitted `(from, to)` move. Anything absent is rejected.
pub const ORDER_TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (OrderStatus::Pending, OrderStatus::Confirmed),
    (OrderStatus::Pending, OrderStatus::Cancelled),
    (OrderStatus::Confirmed, OrderStatus::Processing),
    (OrderStatus::Confirmed, OrderStatus::Cancelled),
    (OrderStatus::Processing, OrderStatus::Shipped),
    (OrderStatus::Processing, OrderStatus::Cancelled),
    (OrderStatus::Shipped, OrderStatus::Delivered),
    (OrderStatus::Delivered, OrderStatus::Returned),
];

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Returned,
    ];

    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        ORDER_TRANSITIONS.contains(&(*self, to))
    }

    pub fn lines_editable(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    pub fn addresses_editable(&self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Returned => "Returned",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_lifecycle() {
        use OrderStatus::*;
        let allowed: Vec<(OrderStatus, OrderStatus)> = OrderStatus::ALL
            .into_iter()
            .flat_map(|from| OrderStatus::ALL.into_iter().map(move |to| (from, to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(allowed.len(), ORDER_TRANSITIONS.len());
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Shipped.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Returned.can_transition_to(Delivered));
    }

    #[test]
    fn editability_windows() {
        assert!(OrderStatus::Pending.lines_editable());
        assert!(!OrderStatus::Confirmed.lines_editable());
        assert!(OrderStatus::Confirmed.addresses_editable());
        assert!(!OrderStatus::Processing.addresses_editable());
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("shipped".parse::<OrderStatus>(), Ok(OrderStatus::Shipped));
        assert!("lost".parse::<OrderStatus>().is_err());
    }
}
