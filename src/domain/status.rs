use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a kitchen order.
///
/// Orders arrive as `Received` or `Pending` and move forward through the
/// kitchen until they reach one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Received,
    Pending,
    Preparing,
    Ready,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Received,
        OrderStatus::Pending,
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// Statuses reachable from `self` through the kitchen board.
    pub fn allowed_transitions(self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Received => &[OrderStatus::Preparing],
            OrderStatus::Pending => &[OrderStatus::Preparing, OrderStatus::Cancelled],
            OrderStatus::Preparing => &[OrderStatus::Ready, OrderStatus::Cancelled],
            OrderStatus::Ready => &[OrderStatus::Completed],
            OrderStatus::Completed | OrderStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Orders still waiting on the kitchen (counted as "pending" on the dashboard).
    pub fn is_active(self) -> bool {
        matches!(
            self,
            OrderStatus::Received | OrderStatus::Pending | OrderStatus::Preparing
        )
    }

    /// Actions the board offers for an order in this status.
    pub fn actions(self) -> Vec<OrderAction> {
        OrderAction::ALL
            .into_iter()
            .filter(|action| action.applies_to(self))
            .collect()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Received => "received",
            OrderStatus::Pending => "pending",
            OrderStatus::Preparing => "preparing",
            OrderStatus::Ready => "ready",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// User-facing actions on the order board. Each maps to exactly one target status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    Accept,
    StartCooking,
    MarkReady,
    Complete,
    Cancel,
}

impl OrderAction {
    pub const ALL: [OrderAction; 5] = [
        OrderAction::Accept,
        OrderAction::StartCooking,
        OrderAction::MarkReady,
        OrderAction::Complete,
        OrderAction::Cancel,
    ];

    pub fn target(self) -> OrderStatus {
        match self {
            OrderAction::Accept | OrderAction::StartCooking => OrderStatus::Preparing,
            OrderAction::MarkReady => OrderStatus::Ready,
            OrderAction::Complete => OrderStatus::Completed,
            OrderAction::Cancel => OrderStatus::Cancelled,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            OrderAction::Accept => "Accept Order",
            OrderAction::StartCooking => "Start Cooking",
            OrderAction::MarkReady => "Mark Ready",
            OrderAction::Complete => "Complete",
            OrderAction::Cancel => "Cancel",
        }
    }

    fn applies_to(self, status: OrderStatus) -> bool {
        match self {
            OrderAction::Accept => status == OrderStatus::Received,
            OrderAction::StartCooking => status == OrderStatus::Pending,
            OrderAction::MarkReady => status == OrderStatus::Preparing,
            OrderAction::Complete => status == OrderStatus::Ready,
            OrderAction::Cancel => {
                matches!(status, OrderStatus::Pending | OrderStatus::Preparing)
            }
        }
    }
}
