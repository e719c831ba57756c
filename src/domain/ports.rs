use super::account::{Amount, UserBalance, UserId, Withdrawal};
use super::accrual::{AccrualError, AccrualReply};
use super::order::{InsertOutcome, Order, OrderStatus, StatusChange};
use super::order_number::OrderNumber;
use crate::error::Result;
use async_trait::async_trait;

/// Durable store of uploaded orders.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Inserts a new order. A taken number is not an error: the existing row
    /// is returned so the caller can resolve ownership.
    async fn insert_order(&self, order: Order) -> Result<InsertOutcome>;
    async fn find_order(&self, number: &OrderNumber) -> Result<Option<Order>>;
    /// Orders of one user, oldest upload first.
    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>>;
    /// Every order not yet in a terminal state, oldest upload first.
    async fn pending_orders(&self) -> Result<Vec<Order>>;
    /// Moves an order forward to a non-crediting status.
    async fn advance_status(&self, number: &OrderNumber, status: OrderStatus)
    -> Result<StatusChange>;
    /// Marks an order processed and credits its owner, as one transaction.
    async fn complete_order(&self, number: &OrderNumber, accrual: Amount) -> Result<StatusChange>;
}

/// Durable store of user balances and withdrawals.
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Creates a zero balance for a new user. Opening twice is a no-op.
    async fn open_account(&self, user: UserId) -> Result<()>;
    async fn balance(&self, user: UserId) -> Result<Option<UserBalance>>;
    async fn credit(&self, user: UserId, amount: Amount) -> Result<UserBalance>;
    /// Records the withdrawal and debits the balance, as one transaction.
    /// Fails with `InsufficientFunds` without touching anything when the
    /// balance does not cover the sum.
    async fn withdraw(&self, withdrawal: Withdrawal) -> Result<UserBalance>;
    /// Withdrawals of one user, oldest first.
    async fn withdrawals_for_user(&self, user: UserId) -> Result<Vec<Withdrawal>>;
}

/// A store backing both ledgers, so the accrual credit can share a
/// transaction with the order update.
pub trait Ledger: OrderLedger + BalanceLedger {}

impl<T: OrderLedger + BalanceLedger> Ledger for T {}

/// The external service that computes accruals.
#[async_trait]
pub trait AccrualSource: Send + Sync {
    async fn query(&self, number: &OrderNumber) -> std::result::Result<AccrualReply, AccrualError>;
}

pub type LedgerArc = std::sync::Arc<dyn Ledger>;
pub type AccrualSourceBox = Box<dyn AccrualSource>;
