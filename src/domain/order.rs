use crate::domain::account::{Amount, UserId};
use crate::domain::order_number::OrderNumber;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of an uploaded order.
///
/// `New -> Registered -> Processing -> {Invalid | Processed}`. Steps may be
/// skipped but never taken backwards, and the two terminal states are final.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl OrderStatus {
    fn rank(self) -> u8 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Registered => 1,
            OrderStatus::Processing => 2,
            OrderStatus::Invalid | OrderStatus::Processed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }

    /// Whether moving from `self` to `next` is a forward step.
    pub fn can_advance_to(self, next: OrderStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::New => "NEW",
            OrderStatus::Registered => "REGISTERED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        };
        f.write_str(s)
    }
}

/// An uploaded order and its accrual.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Order {
    pub user: UserId,
    pub number: OrderNumber,
    pub status: OrderStatus,
    /// Zero until the order is processed, then fixed.
    pub accrual: Amount,
    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    pub fn new(user: UserId, number: OrderNumber, uploaded_at: DateTime<Utc>) -> Self {
        Self {
            user,
            number,
            status: OrderStatus::New,
            accrual: Amount::ZERO,
            uploaded_at,
        }
    }

    /// Applies a non-crediting status change. Returns whether anything changed.
    pub fn advance(&mut self, next: OrderStatus) -> bool {
        if next == OrderStatus::Processed || !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    /// Marks the order processed with its accrual. Returns whether anything
    /// changed; a terminal order is left untouched.
    pub fn complete(&mut self, accrual: Amount) -> bool {
        if !self.status.can_advance_to(OrderStatus::Processed) {
            return false;
        }
        self.status = OrderStatus::Processed;
        self.accrual = accrual;
        true
    }
}

/// Result of asking a ledger to move an order forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Applied,
    /// The order was already at or past the requested state.
    Unchanged,
}

/// Result of inserting a new order.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    /// The number is taken; carries the row that holds it.
    Exists(Order),
}
