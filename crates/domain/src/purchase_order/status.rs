use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PurchaseOrderStatus {
    #[default]
    Draft,
    Submitted,
    Approved,
    Rejected,
    Ordered,
    /// Derived from received quantities; never requested directly.
    PartiallyReceived,
    /// Derived from received quantities; never requested directly.
    Completed,
    Cancelled,
}

pub const PURCHASE_ORDER_TRANSITIONS: &[(PurchaseOrderStatus, PurchaseOrderStatus)] = &[
    (PurchaseOrderStatus::Draft, PurchaseOrderStatus::Submitted),
    (PurchaseOrderStatus::Draft, PurchaseOrderStatus::Cancelled),
    (PurchaseOrderStatus::Submitted, PurchaseOrderStatus::Approved),
    (PurchaseOrderStatus::Submitted, PurchaseOrderStatus::Rejected),
    (PurchaseOrderStatus::Submitted, PurchaseOrderStatus::Cancelled),
    (PurchaseOrderStatus::Approved, PurchaseOrderStatus::Ordered),
    (PurchaseOrderStatus::Approved, PurchaseOrderStatus::Cancelled),
    (PurchaseOrderStatus::Ordered, PurchaseOrderStatus::PartiallyReceived),
    (PurchaseOrderStatus::Ordered, PurchaseOrderStatus::Completed),
    (PurchaseOrderStatus::Ordered, PurchaseOrderStatus::Cancelled),
    (PurchaseOrderStatus::PartiallyReceived, PurchaseOrderStatus::Completed),
    (PurchaseOrderStatus::PartiallyReceived, PurchaseOrderStatus::Cancelled),
];

impl PurchaseOrderStatus {
    pub const ALL: [PurchaseOrderStatus; 8] = [
        PurchaseOrderStatus::Draft,
        PurchaseOrderStatus::Submitted,
        PurchaseOrderStatus::Approved,
        PurchaseOrderStatus::Rejected,
        PurchaseOrderStatus::Ordered,
        PurchaseOrderStatus::PartiallyReceived,
        PurchaseOrderStatus::Completed,
        PurchaseOrderStatus::Cancelled,
    ];

    pub fn can_transition_to(&self, to: PurchaseOrderStatus) -> bool {
        PURCHASE_ORDER_TRANSITIONS.contains(&(*self, to))
    }

    pub fn caller_settable(&self) -> bool {
        !matches!(
            self,
            PurchaseOrderStatus::PartiallyReceived | PurchaseOrderStatus::Completed
        )
    }

    pub fn accepts_receipts(&self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Ordered | PurchaseOrderStatus::PartiallyReceived
        )
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            PurchaseOrderStatus::Completed
                | PurchaseOrderStatus::Cancelled
                | PurchaseOrderStatus::Rejected
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "Draft",
            PurchaseOrderStatus::Submitted => "Submitted",
            PurchaseOrderStatus::Approved => "Approved",
            PurchaseOrderStatus::Rejected => "Rejected",
            PurchaseOrderStatus::Ordered => "Ordered",
            PurchaseOrderStatus::PartiallyReceived => "PartiallyReceived",
            PurchaseOrderStatus::Completed => "Completed",
            PurchaseOrderStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PurchaseOrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PurchaseOrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown purchase order status: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipts_only_while_ordered() {
        let accepting: Vec<_> = PurchaseOrderStatus::ALL
            .into_iter()
            .filter(PurchaseOrderStatus::accepts_receipts)
            .collect();
        assert_eq!(
            accepting,
            vec![
                PurchaseOrderStatus::Ordered,
                PurchaseOrderStatus::PartiallyReceived
            ]
        );
    }

    #[test]
    fn closed_states_have_no_exits() {
        for from in PurchaseOrderStatus::ALL.into_iter().filter(|s| s.is_closed()) {
            assert!(
                PurchaseOrderStatus::ALL
                    .into_iter()
                    .all(|to| !from.can_transition_to(to)),
                "{from} should be terminal"
            );
        }
    }
}
