//! Order status state machine.

use serde::{Deserialize, Serialize};

use crate::error::OrderError;

/// The status of an order in the fulfillment lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Reserving ──┬──► Completed
///    │                    └──► Failed
///    ├──► Failed
///    └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Created and waiting to be fulfilled.
    #[default]
    Pending,

    /// Claimed by a fulfillment worker; inventory is being reserved.
    Reserving,

    /// All line items were reserved (terminal state).
    Completed,

    /// Fulfillment gave up; see the status reason (terminal state).
    Failed,

    /// Cancelled before fulfillment (terminal state).
    Cancelled,
}

impl OrderStatus {
    /// Returns true if a worker may claim the order.
    pub fn can_claim(&self) -> bool {
        matches!(self, OrderStatus::Pending)
    }

    /// Returns true if moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (
                OrderStatus::Pending,
                OrderStatus::Reserving | OrderStatus::Failed | OrderStatus::Cancelled
            ) | (
                OrderStatus::Reserving,
                OrderStatus::Completed | OrderStatus::Failed
            )
        )
    }

    /// Returns every status that may legally move to `next`.
    pub fn predecessors(next: OrderStatus) -> &'static [OrderStatus] {
        match next {
            OrderStatus::Pending => &[],
            OrderStatus::Reserving | OrderStatus::Cancelled => &[OrderStatus::Pending],
            OrderStatus::Completed => &[OrderStatus::Reserving],
            OrderStatus::Failed => &[OrderStatus::Pending, OrderStatus::Reserving],
        }
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }

    /// Returns the status as stored and published.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Reserving => "reserving",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "reserving" => Ok(OrderStatus::Reserving),
            "completed" => Ok(OrderStatus::Completed),
            "failed" => Ok(OrderStatus::Failed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Reserving,
        OrderStatus::Completed,
        OrderStatus::Failed,
        OrderStatus::Cancelled,
    ];

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_only_pending_can_be_claimed() {
        assert!(OrderStatus::Pending.can_claim());
        assert!(!OrderStatus::Reserving.can_claim());
        assert!(!OrderStatus::Completed.can_claim());
        assert!(!OrderStatus::Failed.can_claim());
        assert!(!OrderStatus::Cancelled.can_claim());
    }

    #[test]
    fn test_terminal_states_never_transition() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_nothing_returns_to_pending() {
        for from in ALL {
            assert!(!from.can_transition_to(OrderStatus::Pending));
        }
    }

    #[test]
    fn test_predecessors_match_transition_table() {
        for to in ALL {
            for from in ALL {
                let listed = OrderStatus::predecessors(to).contains(&from);
                assert_eq!(listed, from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_string_round_trip() {
        for status in ALL {
            let parsed: OrderStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serializes_lowercase() {
        let json = serde_json::to_string(&OrderStatus::Reserving).unwrap();
        assert_eq!(json, "\"reserving\"");
    }
}
