//! Test doubles for the accrual service and the ledger.
//!
//! These let the worker and the services be exercised without a running
//! accrual service, and let storage failures be injected on demand.

use crate::domain::account::{Amount, UserBalance, UserId, Withdrawal};
use crate::domain::accrual::{AccrualError, AccrualReply};
use crate::domain::order::{InsertOutcome, Order, OrderStatus, StatusChange};
use crate::domain::order_number::OrderNumber;
use crate::domain::ports::{AccrualSource, BalanceLedger, OrderLedger};
use crate::error::{LoyaltyError, Result};
use crate::infrastructure::in_memory::InMemoryLedger;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;

type Reply = std::result::Result<AccrualReply, AccrualError>;

#[derive(Default)]
struct Script {
    replies: HashMap<String, VecDeque<Reply>>,
    calls: Vec<(String, Instant)>,
}

/// Accrual service answering from a per-order script.
///
/// Each query pops the next scripted reply for the number. Once the script of
/// a number runs dry the service keeps answering `Registered`. Every query is
/// recorded with the (tokio) time it was made. Clones share the script.
#[derive(Clone, Default)]
pub struct ScriptedAccrualSource {
    script: Arc<Mutex<Script>>,
}

impl ScriptedAccrualSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends replies to the script of `number`.
    pub fn script(&self, number: &str, replies: impl IntoIterator<Item = Reply>) {
        let mut script = self.lock();
        script
            .replies
            .entry(number.to_string())
            .or_default()
            .extend(replies);
    }

    /// Every query made so far, in order.
    pub fn calls(&self) -> Vec<(String, Instant)> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, number: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(n, _)| n == number)
            .count()
    }
}

#[async_trait]
impl AccrualSource for ScriptedAccrualSource {
    async fn query(&self, number: &OrderNumber) -> Reply {
        let mut script = self.lock();
        script.calls.push((number.to_string(), Instant::now()));
        script
            .replies
            .get_mut(number.as_str())
            .and_then(|replies| replies.pop_front())
            .unwrap_or(Ok(AccrualReply::Registered))
    }
}

/// In-memory ledger that can be told to fail.
#[derive(Clone, Default)]
pub struct FailingLedger {
    inner: InMemoryLedger,
    fail_on_complete: Arc<AtomicBool>,
    fail_on_withdraw: Arc<AtomicBool>,
    fail_on_pending: Arc<AtomicBool>,
}

impl FailingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_complete(&self, fail: bool) {
        self.fail_on_complete.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_withdraw(&self, fail: bool) {
        self.fail_on_withdraw.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_on_pending(&self, fail: bool) {
        self.fail_on_pending.store(fail, Ordering::SeqCst);
    }

    fn injected() -> LoyaltyError {
        LoyaltyError::storage("injected storage failure")
    }
}

#[async_trait]
impl OrderLedger for FailingLedger {
    async fn insert_order(&self, order: Order) -> Result<InsertOutcome> {
        self.inner.insert_order(order).await
    }

    async fn find_order(&self, number: &OrderNumber) -> Result<Option<Order>> {
        self.inner.find_order(number).await
    }

    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>> {
        self.inner.orders_for_user(user).await
    }

    async fn pending_orders(&self) -> Result<Vec<Order>> {
        if self.fail_on_pending.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.pending_orders().await
    }

    async fn advance_status(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
    ) -> Result<StatusChange> {
        self.inner.advance_status(number, status).await
    }

    async fn complete_order(&self, number: &OrderNumber, accrual: Amount) -> Result<StatusChange> {
        if self.fail_on_complete.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.complete_order(number, accrual).await
    }
}

#[async_trait]
impl BalanceLedger for FailingLedger {
    async fn open_account(&self, user: UserId) -> Result<()> {
        self.inner.open_account(user).await
    }

    async fn balance(&self, user: UserId) -> Result<Option<UserBalance>> {
        self.inner.balance(user).await
    }

    async fn credit(&self, user: UserId, amount: Amount) -> Result<UserBalance> {
        self.inner.credit(user, amount).await
    }

    async fn withdraw(&self, withdrawal: Withdrawal) -> Result<UserBalance> {
        if self.fail_on_withdraw.load(Ordering::SeqCst) {
            return Err(Self::injected());
        }
        self.inner.withdraw(withdrawal).await
    }

    async fn withdrawals_for_user(&self, user: UserId) -> Result<Vec<Withdrawal>> {
        self.inner.withdrawals_for_user(user).await
    }
}
