//! Order status state machine.
//!
//! ```text
//! PENDING → CONFIRMED → PROCESSING → SHIPPED → DELIVERED
//!    │          │            │
//!    └──────────┴────────────┴──────→ CANCELLED
//! ```
//!
//! Orders only move forward along the fulfilment line (skipping steps is
//! allowed) and can be cancelled until they ship. `DELIVERED` and
//! `CANCELLED` are terminal. Re-applying the current status is accepted as a
//! no-op so that repeated admin requests are idempotent.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Order lifecycle status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Placed, awaiting confirmation. The only initial state.
    #[default]
    Pending,
    /// Accepted by the shop.
    Confirmed,
    /// Being picked and packed.
    Processing,
    /// Handed to the carrier.
    Shipped,
    /// Received by the customer.
    Delivered,
    /// Cancelled; purchased stock has been returned.
    Cancelled,
}

/// A status change that the state machine does not allow.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot move order from {from} to {to}")]
pub struct InvalidTransition {
    /// Current status.
    pub from: OrderStatus,
    /// Requested status.
    pub to: OrderStatus,
}

/// Outcome of a permitted status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Requested status equals the current one; nothing to write.
    Unchanged,
    /// Plain status update.
    Advance,
    /// Entering `CANCELLED`; stock for every line must be restored.
    Cancel,
}

impl OrderStatus {
    /// All statuses in fulfilment order.
    pub const ALL: [Self; 6] = [
        Self::Pending,
        Self::Confirmed,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Statuses whose order totals count as revenue.
    pub const REVENUE: [Self; 4] = [
        Self::Confirmed,
        Self::Processing,
        Self::Shipped,
        Self::Delivered,
    ];

    /// Database / wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether orders in this status count toward revenue.
    #[must_use]
    pub const fn counts_as_revenue(self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::Processing | Self::Shipped | Self::Delivered
        )
    }

    /// Whether no further status changes are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Position on the fulfilment line (`None` for `CANCELLED`).
    const fn rank(self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Processing => Some(2),
            Self::Shipped => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled => None,
        }
    }

    /// Check whether an order in this status may move to `to`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` for backwards moves, moves out of a
    /// terminal status, and cancellation after shipping.
    pub fn transition_to(self, to: Self) -> Result<Transition, InvalidTransition> {
        if self == to {
            return Ok(Transition::Unchanged);
        }

        let allowed = match (self.rank(), to.rank()) {
            // Cancellation is allowed until the parcel leaves the building
            (Some(from), None) => from < 3,
            (Some(from), Some(next)) => next > from,
            (None, _) => false,
        };

        if !allowed {
            return Err(InvalidTransition { from: self, to });
        }

        Ok(if to == Self::Cancelled {
            Transition::Cancel
        } else {
            Transition::Advance
        })
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("invalid order status: {s}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_pending() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
    }

    #[test]
    fn test_forward_moves_allowed() {
        use OrderStatus::*;

        assert_eq!(Pending.transition_to(Confirmed), Ok(Transition::Advance));
        assert_eq!(Confirmed.transition_to(Processing), Ok(Transition::Advance));
        assert_eq!(Processing.transition_to(Shipped), Ok(Transition::Advance));
        assert_eq!(Shipped.transition_to(Delivered), Ok(Transition::Advance));
        // Skipping ahead is fine
        assert_eq!(Pending.transition_to(Shipped), Ok(Transition::Advance));
    }

    #[test]
    fn test_backward_moves_rejected() {
        use OrderStatus::*;

        assert_eq!(
            Delivered.transition_to(Pending),
            Err(InvalidTransition {
                from: Delivered,
                to: Pending
            })
        );
        assert!(Shipped.transition_to(Confirmed).is_err());
        assert!(Processing.transition_to(Pending).is_err());
    }

    #[test]
    fn test_cancellation_window() {
        use OrderStatus::*;

        assert_eq!(Pending.transition_to(Cancelled), Ok(Transition::Cancel));
        assert_eq!(Confirmed.transition_to(Cancelled), Ok(Transition::Cancel));
        assert_eq!(Processing.transition_to(Cancelled), Ok(Transition::Cancel));
        assert!(Shipped.transition_to(Cancelled).is_err());
        assert!(Delivered.transition_to(Cancelled).is_err());
    }

    #[test]
    fn test_cancelled_is_terminal_but_idempotent() {
        use OrderStatus::*;

        assert_eq!(Cancelled.transition_to(Cancelled), Ok(Transition::Unchanged));
        for status in [Pending, Confirmed, Processing, Shipped, Delivered] {
            assert!(Cancelled.transition_to(status).is_err());
        }
    }

    #[test]
    fn test_revenue_statuses() {
        let revenue: Vec<_> = OrderStatus::ALL
            .into_iter()
            .filter(|s| s.counts_as_revenue())
            .collect();
        assert_eq!(revenue, OrderStatus::REVENUE.to_vec());
        assert!(!OrderStatus::Pending.counts_as_revenue());
        assert!(!OrderStatus::Cancelled.counts_as_revenue());
    }

    #[test]
    fn test_serde_and_from_str() {
        let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");
        assert_eq!(
            "shipped".parse::<OrderStatus>().unwrap(),
            OrderStatus::Shipped
        );
        assert!("LOST".parse::<OrderStatus>().is_err());
    }
}
