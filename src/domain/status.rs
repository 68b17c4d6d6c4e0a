//! Order and sub-order state machines.
//!
//! Transition tables are expressed as exhaustive `match` arms so that adding a
//! state forces every table to be revisited.
//!
//! ```text
//! Inited -> PendingPayment -> Paymenting -> Paid -> ToBeShipped -> Shipped -> Done -> Closed
//!                 |               |  \
//!                 v               v   -> PayFail -> Closed
//!               Closed          Closed
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of an [`Order`](super::order::Order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Inited,
    PendingPayment,
    Paymenting,
    Paid,
    PayFail,
    ToBeShipped,
    Shipped,
    Done,
    Closed,
}

/// Lifecycle of a [`SubOrder`](super::order::SubOrder).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubOrderStatus {
    Inited,
    ToBeShipped,
    Shipped,
    ApplyCanceled,
    Canceled,
    ApplyRefunds,
    Refunding,
    Done,
    Closed,
}

/// Terminal state of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPaymentStatus {
    Inited,
    Failure,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("order status is already {}", .0.description())]
    OrderUnchanged(OrderStatus),

    #[error(
        "order status cannot change from {} to {}",
        .from.description(),
        .to.description()
    )]
    Order { from: OrderStatus, to: OrderStatus },

    #[error("sub-order status is already {}", .0.description())]
    SubOrderUnchanged(SubOrderStatus),

    #[error(
        "sub-order status cannot change from {} to {}",
        .from.description(),
        .to.description()
    )]
    SubOrder {
        from: SubOrderStatus,
        to: SubOrderStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} status: {value}")]
pub struct ParseStatusError {
    kind: &'static str,
    value: String,
}

/// A status value paired with its human-readable name, for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusInfo<S> {
    pub name: &'static str,
    pub value: S,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        OrderStatus::Inited,
        OrderStatus::PendingPayment,
        OrderStatus::Paymenting,
        OrderStatus::Paid,
        OrderStatus::PayFail,
        OrderStatus::ToBeShipped,
        OrderStatus::Shipped,
        OrderStatus::Done,
        OrderStatus::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Inited => "INITED",
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::Paymenting => "PAYMENTING",
            OrderStatus::Paid => "PAID",
            OrderStatus::PayFail => "PAY_FAIL",
            OrderStatus::ToBeShipped => "TO_BE_SHIPPED",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Done => "DONE",
            OrderStatus::Closed => "CLOSED",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            OrderStatus::Inited => "initialized",
            OrderStatus::PendingPayment => "pending payment",
            OrderStatus::Paymenting => "paying",
            OrderStatus::Paid => "paid",
            OrderStatus::PayFail => "payment failed",
            OrderStatus::ToBeShipped => "to be shipped",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Done => "done",
            OrderStatus::Closed => "closed",
        }
    }

    /// Statuses reachable in one step from `self`.
    pub fn allowed_next(self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Inited => &[OrderStatus::PendingPayment],
            OrderStatus::PendingPayment => &[OrderStatus::Paymenting, OrderStatus::Closed],
            OrderStatus::Paymenting => &[
                OrderStatus::Paid,
                OrderStatus::PayFail,
                OrderStatus::Closed,
            ],
            OrderStatus::Paid => &[OrderStatus::ToBeShipped],
            OrderStatus::PayFail => &[OrderStatus::Closed],
            OrderStatus::ToBeShipped => &[OrderStatus::Shipped],
            OrderStatus::Shipped => &[OrderStatus::Done],
            OrderStatus::Done => &[OrderStatus::Closed],
            OrderStatus::Closed => &[],
        }
    }

    pub fn validate_next(self, next: OrderStatus) -> Result<(), TransitionError> {
        if self == next {
            return Err(TransitionError::OrderUnchanged(self));
        }
        if !self.allowed_next().contains(&next) {
            return Err(TransitionError::Order {
                from: self,
                to: next,
            });
        }
        Ok(())
    }

    /// Successor on the happy path, used to project upcoming timeline steps.
    pub fn next(self) -> Option<OrderStatus> {
        match self {
            OrderStatus::Inited | OrderStatus::PendingPayment => Some(OrderStatus::Paymenting),
            OrderStatus::Paymenting => Some(OrderStatus::Paid),
            OrderStatus::Paid => Some(OrderStatus::ToBeShipped),
            OrderStatus::ToBeShipped => Some(OrderStatus::Shipped),
            OrderStatus::Shipped => Some(OrderStatus::Done),
            OrderStatus::Done => Some(OrderStatus::Closed),
            OrderStatus::PayFail | OrderStatus::Closed => None,
        }
    }

    pub fn list() -> Vec<StatusInfo<OrderStatus>> {
        Self::ALL
            .iter()
            .map(|&value| StatusInfo {
                name: value.description(),
                value,
            })
            .collect()
    }
}

impl SubOrderStatus {
    pub const ALL: [SubOrderStatus; 9] = [
        SubOrderStatus::Inited,
        SubOrderStatus::ToBeShipped,
        SubOrderStatus::Shipped,
        SubOrderStatus::ApplyCanceled,
        SubOrderStatus::Canceled,
        SubOrderStatus::ApplyRefunds,
        SubOrderStatus::Refunding,
        SubOrderStatus::Done,
        SubOrderStatus::Closed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SubOrderStatus::Inited => "INITED",
            SubOrderStatus::ToBeShipped => "TO_BE_SHIPPED",
            SubOrderStatus::Shipped => "SHIPPED",
            SubOrderStatus::ApplyCanceled => "APPLY_CANCELED",
            SubOrderStatus::Canceled => "CANCELED",
            SubOrderStatus::ApplyRefunds => "APPLY_REFUNDS",
            SubOrderStatus::Refunding => "REFUNDING",
            SubOrderStatus::Done => "DONE",
            SubOrderStatus::Closed => "CLOSED",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SubOrderStatus::Inited => "initialized",
            SubOrderStatus::ToBeShipped => "to be shipped",
            SubOrderStatus::Shipped => "shipped",
            SubOrderStatus::ApplyCanceled => "cancellation requested",
            SubOrderStatus::Canceled => "canceled",
            SubOrderStatus::ApplyRefunds => "refund requested",
            SubOrderStatus::Refunding => "refunding",
            SubOrderStatus::Done => "done",
            SubOrderStatus::Closed => "closed",
        }
    }

    pub fn allowed_next(self) -> &'static [SubOrderStatus] {
        match self {
            SubOrderStatus::Inited => &[SubOrderStatus::ToBeShipped, SubOrderStatus::ApplyCanceled],
            SubOrderStatus::ToBeShipped => &[SubOrderStatus::Shipped],
            SubOrderStatus::Shipped => &[SubOrderStatus::Done],
            SubOrderStatus::ApplyCanceled => &[SubOrderStatus::Canceled],
            SubOrderStatus::Canceled => &[SubOrderStatus::Done],
            SubOrderStatus::ApplyRefunds => &[SubOrderStatus::Refunding],
            SubOrderStatus::Refunding => &[SubOrderStatus::Done],
            SubOrderStatus::Done => &[SubOrderStatus::Closed],
            SubOrderStatus::Closed => &[],
        }
    }

    pub fn validate_next(self, next: SubOrderStatus) -> Result<(), TransitionError> {
        if self == next {
            return Err(TransitionError::SubOrderUnchanged(self));
        }
        if !self.allowed_next().contains(&next) {
            return Err(TransitionError::SubOrder {
                from: self,
                to: next,
            });
        }
        Ok(())
    }

    /// Sub-orders in these states do not hold back the whole-order
    /// advance to to-be-shipped.
    pub fn is_ready_for_shipping(self) -> bool {
        matches!(self, SubOrderStatus::ToBeShipped | SubOrderStatus::Canceled)
    }

    pub fn list() -> Vec<StatusInfo<SubOrderStatus>> {
        Self::ALL
            .iter()
            .map(|&value| StatusInfo {
                name: value.description(),
                value,
            })
            .collect()
    }
}

impl OrderPaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderPaymentStatus::Inited => "INITED",
            OrderPaymentStatus::Failure => "FAILURE",
            OrderPaymentStatus::Success => "SUCCESS",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for SubOrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for OrderPaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: "order",
                value: s.to_string(),
            })
    }
}

impl FromStr for SubOrderStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError {
                kind: "sub-order",
                value: s.to_string(),
            })
    }
}

impl FromStr for OrderPaymentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITED" => Ok(OrderPaymentStatus::Inited),
            "FAILURE" => Ok(OrderPaymentStatus::Failure),
            "SUCCESS" => Ok(OrderPaymentStatus::Success),
            other => Err(ParseStatusError {
                kind: "payment",
                value: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER_EDGES: &[(OrderStatus, OrderStatus)] = &[
        (OrderStatus::Inited, OrderStatus::PendingPayment),
        (OrderStatus::PendingPayment, OrderStatus::Paymenting),
        (OrderStatus::PendingPayment, OrderStatus::Closed),
        (OrderStatus::Paymenting, OrderStatus::Paid),
        (OrderStatus::Paymenting, OrderStatus::PayFail),
        (OrderStatus::Paymenting, OrderStatus::Closed),
        (OrderStatus::Paid, OrderStatus::ToBeShipped),
        (OrderStatus::PayFail, OrderStatus::Closed),
        (OrderStatus::ToBeShipped, OrderStatus::Shipped),
        (OrderStatus::Shipped, OrderStatus::Done),
        (OrderStatus::Done, OrderStatus::Closed),
    ];

    const SUB_ORDER_EDGES: &[(SubOrderStatus, SubOrderStatus)] = &[
        (SubOrderStatus::Inited, SubOrderStatus::ToBeShipped),
        (SubOrderStatus::Inited, SubOrderStatus::ApplyCanceled),
        (SubOrderStatus::ToBeShipped, SubOrderStatus::Shipped),
        (SubOrderStatus::Shipped, SubOrderStatus::Done),
        (SubOrderStatus::ApplyCanceled, SubOrderStatus::Canceled),
        (SubOrderStatus::Canceled, SubOrderStatus::Done),
        (SubOrderStatus::ApplyRefunds, SubOrderStatus::Refunding),
        (SubOrderStatus::Refunding, SubOrderStatus::Done),
        (SubOrderStatus::Done, SubOrderStatus::Closed),
    ];

    #[test]
    fn order_transitions_match_table_for_every_pair() {
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                let listed = ORDER_EDGES.contains(&(from, to));
                assert_eq!(
                    from.validate_next(to).is_ok(),
                    listed,
                    "{from} -> {to} should be {}",
                    if listed { "allowed" } else { "rejected" }
                );
            }
        }
    }

    #[test]
    fn sub_order_transitions_match_table_for_every_pair() {
        for from in SubOrderStatus::ALL {
            for to in SubOrderStatus::ALL {
                let listed = SUB_ORDER_EDGES.contains(&(from, to));
                assert_eq!(from.validate_next(to).is_ok(), listed, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn same_status_is_rejected_as_unchanged() {
        for status in OrderStatus::ALL {
            assert_eq!(
                status.validate_next(status),
                Err(TransitionError::OrderUnchanged(status))
            );
        }
        for status in SubOrderStatus::ALL {
            assert_eq!(
                status.validate_next(status),
                Err(TransitionError::SubOrderUnchanged(status))
            );
        }
    }

    #[test]
    fn closed_is_terminal() {
        assert!(OrderStatus::Closed.allowed_next().is_empty());
        assert!(OrderStatus::Closed.next().is_none());
    }

    #[test]
    fn transfer_error_names_both_statuses() {
        let err = OrderStatus::PendingPayment
            .validate_next(OrderStatus::Done)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "order status cannot change from pending payment to done"
        );
    }

    #[test]
    fn storage_codes_parse_back() {
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>(), Ok(status));
        }
        for status in SubOrderStatus::ALL {
            assert_eq!(status.as_str().parse::<SubOrderStatus>(), Ok(status));
        }
        assert!("PENDING".parse::<OrderStatus>().is_err());
        assert_eq!(
            "SUCCESS".parse::<OrderPaymentStatus>(),
            Ok(OrderPaymentStatus::Success)
        );
    }

    #[test]
    fn listing_is_in_lifecycle_order_with_names() {
        let list = OrderStatus::list();
        assert_eq!(list.len(), 9);
        assert_eq!(list[0].value, OrderStatus::Inited);
        assert_eq!(list[1].name, "pending payment");
        assert_eq!(list[8].value, OrderStatus::Closed);
    }

    #[test]
    fn happy_path_successors() {
        assert_eq!(OrderStatus::Inited.next(), Some(OrderStatus::Paymenting));
        assert_eq!(OrderStatus::Shipped.next(), Some(OrderStatus::Done));
        assert_eq!(OrderStatus::PayFail.next(), None);
    }
}
