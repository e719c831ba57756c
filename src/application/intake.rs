use super::worker::AccrualQueue;
use crate::domain::account::UserId;
use crate::domain::order::{InsertOutcome, Order};
use crate::domain::order_number::OrderNumber;
use crate::domain::ports::{BalanceLedger, LedgerArc, OrderLedger};
use crate::error::{LoyaltyError, Outcome, Result};
use chrono::Utc;
use tracing::{info, warn};

/// How an accepted order upload was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The order is new and has been queued for accrual.
    Admitted,
    /// The caller had already uploaded this number; nothing changed.
    AlreadyAdmitted,
}

impl Admission {
    pub fn outcome(self) -> Outcome {
        match self {
            Admission::Admitted => Outcome::Accepted,
            Admission::AlreadyAdmitted => Outcome::AlreadyAdmitted,
        }
    }
}

/// Accepts order uploads and hands them to the accrual worker.
#[derive(Clone)]
pub struct OrderIntake {
    ledger: LedgerArc,
    queue: AccrualQueue,
}

impl OrderIntake {
    pub fn new(ledger: LedgerArc, queue: AccrualQueue) -> Self {
        Self { ledger, queue }
    }

    /// Registers `raw` as an order of `user`.
    ///
    /// Order numbers are unique across all users: re-uploading one's own
    /// number is an idempotent success, uploading someone else's is a
    /// conflict. Only users with an open account may upload. A new order is
    /// stored as NEW and queued for accrual; the call waits while the
    /// worker's queue is full.
    pub async fn submit_order(&self, user: UserId, raw: &str) -> Result<Admission> {
        let number = OrderNumber::parse(raw)?;
        if self.ledger.balance(user).await?.is_none() {
            return Err(LoyaltyError::NotFound(format!("account of user {}", user)));
        }

        if let Some(existing) = self.ledger.find_order(&number).await? {
            return Self::resolve_owner(user, &existing);
        }

        // Two uploads of the same number can both get past the lookup; the
        // ledger lets only one insert through.
        let order = Order::new(user, number.clone(), Utc::now());
        if let InsertOutcome::Exists(existing) = self.ledger.insert_order(order).await? {
            return Self::resolve_owner(user, &existing);
        }
        info!(user, order = %number, "Order admitted");

        // The order is stored; if the worker is gone it is picked up again
        // from the ledger on the next start.
        if let Err(e) = self.queue.enqueue(number.clone()).await {
            warn!(order = %number, "Could not queue order for accrual: {}", e);
        }

        Ok(Admission::Admitted)
    }

    /// Orders of `user`, oldest upload first.
    pub async fn list_orders(&self, user: UserId) -> Result<Vec<Order>> {
        self.ledger.orders_for_user(user).await
    }

    fn resolve_owner(user: UserId, existing: &Order) -> Result<Admission> {
        if existing.user == user {
            Ok(Admission::AlreadyAdmitted)
        } else {
            Err(LoyaltyError::OwnedByAnotherUser(existing.number.to_string()))
        }
    }
}
