use crate::domain::account::{Amount, UserBalance, UserId, Withdrawal};
use crate::domain::order::{InsertOutcome, Order, OrderStatus, StatusChange};
use crate::domain::order_number::OrderNumber;
use crate::domain::ports::{BalanceLedger, OrderLedger};
use crate::error::{LoyaltyError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    orders: HashMap<OrderNumber, Order>,
    /// Order numbers in upload order.
    uploads: Vec<OrderNumber>,
    balances: HashMap<UserId, UserBalance>,
    withdrawals: Vec<Withdrawal>,
}

/// A thread-safe in-memory ledger holding orders and balances.
///
/// Every operation runs under a single write section of one `RwLock`, which
/// makes each of them a transaction: changes are staged on copies and only
/// written back once every step succeeded. Cloning shares the state.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<State>>,
}

impl InMemoryLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing_order(number: &OrderNumber) -> LoyaltyError {
    LoyaltyError::NotFound(format!("order {}", number))
}

fn missing_account(user: UserId) -> LoyaltyError {
    LoyaltyError::NotFound(format!("account of user {}", user))
}

#[async_trait]
impl OrderLedger for InMemoryLedger {
    async fn insert_order(&self, order: Order) -> Result<InsertOutcome> {
        let mut state = self.state.write().await;
        if let Some(existing) = state.orders.get(&order.number) {
            return Ok(InsertOutcome::Exists(existing.clone()));
        }
        state.uploads.push(order.number.clone());
        state.orders.insert(order.number.clone(), order);
        Ok(InsertOutcome::Inserted)
    }

    async fn find_order(&self, number: &OrderNumber) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(number).cloned())
    }

    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .uploads
            .iter()
            .filter_map(|number| state.orders.get(number))
            .filter(|order| order.user == user)
            .cloned()
            .collect())
    }

    async fn pending_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        Ok(state
            .uploads
            .iter()
            .filter_map(|number| state.orders.get(number))
            .filter(|order| !order.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn advance_status(
        &self,
        number: &OrderNumber,
        status: OrderStatus,
    ) -> Result<StatusChange> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(number)
            .ok_or_else(|| missing_order(number))?;
        if order.advance(status) {
            Ok(StatusChange::Applied)
        } else {
            Ok(StatusChange::Unchanged)
        }
    }

    async fn complete_order(&self, number: &OrderNumber, accrual: Amount) -> Result<StatusChange> {
        let mut state = self.state.write().await;

        let mut order = state
            .orders
            .get(number)
            .cloned()
            .ok_or_else(|| missing_order(number))?;
        if !order.complete(accrual) {
            return Ok(StatusChange::Unchanged);
        }

        let mut balance = state
            .balances
            .get(&order.user)
            .cloned()
            .ok_or_else(|| missing_account(order.user))?;
        balance.credit(accrual)?;

        // Both steps succeeded; commit.
        state.balances.insert(balance.user, balance);
        state.orders.insert(order.number.clone(), order);
        Ok(StatusChange::Applied)
    }
}

#[async_trait]
impl BalanceLedger for InMemoryLedger {
    async fn open_account(&self, user: UserId) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .balances
            .entry(user)
            .or_insert_with(|| UserBalance::new(user));
        Ok(())
    }

    async fn balance(&self, user: UserId) -> Result<Option<UserBalance>> {
        let state = self.state.read().await;
        Ok(state.balances.get(&user).cloned())
    }

    async fn credit(&self, user: UserId, amount: Amount) -> Result<UserBalance> {
        let mut state = self.state.write().await;
        let balance = state
            .balances
            .get_mut(&user)
            .ok_or_else(|| missing_account(user))?;
        balance.credit(amount)?;
        Ok(balance.clone())
    }

    async fn withdraw(&self, withdrawal: Withdrawal) -> Result<UserBalance> {
        let mut state = self.state.write().await;
        let mut balance = state
            .balances
            .get(&withdrawal.user)
            .cloned()
            .ok_or_else(|| missing_account(withdrawal.user))?;
        balance.debit(withdrawal.sum)?;

        state.balances.insert(balance.user, balance.clone());
        state.withdrawals.push(withdrawal);
        Ok(balance)
    }

    async fn withdrawals_for_user(&self, user: UserId) -> Result<Vec<Withdrawal>> {
        let state = self.state.read().await;
        Ok(state
            .withdrawals
            .iter()
            .filter(|w| w.user == user)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn number(s: &str) -> OrderNumber {
        OrderNumber::parse(s).unwrap()
    }

    fn minor(v: i64) -> Amount {
        Amount::from_minor(v).unwrap()
    }

    #[tokio::test]
    async fn test_insert_is_unique_per_number() {
        let ledger = InMemoryLedger::new();
        let first = Order::new(1, number("79927398713"), Utc::now());
        let second = Order::new(2, number("79927398713"), Utc::now());

        assert_eq!(
            ledger.insert_order(first.clone()).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            ledger.insert_order(second).await.unwrap(),
            InsertOutcome::Exists(first.clone())
        );
        assert_eq!(ledger.orders_for_user(2).await.unwrap().len(), 0);
        assert_eq!(ledger.orders_for_user(1).await.unwrap(), vec![first]);
    }

    #[tokio::test]
    async fn test_orders_keep_upload_order() {
        let ledger = InMemoryLedger::new();
        for n in ["12345674", "79927398713", "18"] {
            ledger
                .insert_order(Order::new(1, number(n), Utc::now()))
                .await
                .unwrap();
        }
        let numbers: Vec<String> = ledger
            .orders_for_user(1)
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.number.to_string())
            .collect();
        assert_eq!(numbers, vec!["12345674", "79927398713", "18"]);
    }

    #[tokio::test]
    async fn test_pending_orders_skip_terminal() {
        let ledger = InMemoryLedger::new();
        ledger.open_account(1).await.unwrap();
        for n in ["12345674", "79927398713", "18"] {
            ledger
                .insert_order(Order::new(1, number(n), Utc::now()))
                .await
                .unwrap();
        }
        ledger
            .advance_status(&number("12345674"), OrderStatus::Invalid)
            .await
            .unwrap();
        ledger
            .complete_order(&number("18"), minor(100))
            .await
            .unwrap();

        let pending = ledger.pending_orders().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].number, number("79927398713"));
    }

    #[tokio::test]
    async fn test_advance_status_is_forward_only() {
        let ledger = InMemoryLedger::new();
        let n = number("79927398713");
        ledger
            .insert_order(Order::new(1, n.clone(), Utc::now()))
            .await
            .unwrap();

        assert_eq!(
            ledger
                .advance_status(&n, OrderStatus::Processing)
                .await
                .unwrap(),
            StatusChange::Applied
        );
        assert_eq!(
            ledger
                .advance_status(&n, OrderStatus::Registered)
                .await
                .unwrap(),
            StatusChange::Unchanged
        );
        assert!(matches!(
            ledger
                .advance_status(&number("18"), OrderStatus::Processing)
                .await,
            Err(LoyaltyError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_complete_order_credits_once() {
        let ledger = InMemoryLedger::new();
        let n = number("79927398713");
        ledger.open_account(1).await.unwrap();
        ledger
            .insert_order(Order::new(1, n.clone(), Utc::now()))
            .await
            .unwrap();

        assert_eq!(
            ledger.complete_order(&n, minor(500)).await.unwrap(),
            StatusChange::Applied
        );
        assert_eq!(
            ledger.complete_order(&n, minor(500)).await.unwrap(),
            StatusChange::Unchanged
        );

        let order = ledger.find_order(&n).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processed);
        assert_eq!(order.accrual, minor(500));
        assert_eq!(ledger.balance(1).await.unwrap().unwrap().current, minor(500));
    }

    #[tokio::test]
    async fn test_complete_order_rolls_back_on_credit_failure() {
        let ledger = InMemoryLedger::new();
        let n = number("79927398713");
        ledger.open_account(1).await.unwrap();
        ledger.credit(1, minor(i64::MAX - 10)).await.unwrap();
        ledger
            .insert_order(Order::new(1, n.clone(), Utc::now()))
            .await
            .unwrap();
        ledger
            .advance_status(&n, OrderStatus::Processing)
            .await
            .unwrap();

        let result = ledger.complete_order(&n, minor(500)).await;
        assert!(matches!(result, Err(LoyaltyError::Storage(_))));

        let order = ledger.find_order(&n).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.accrual, Amount::ZERO);
        assert_eq!(
            ledger.balance(1).await.unwrap().unwrap().current,
            minor(i64::MAX - 10)
        );
    }

    #[tokio::test]
    async fn test_complete_order_without_account_changes_nothing() {
        let ledger = InMemoryLedger::new();
        let n = number("79927398713");
        ledger
            .insert_order(Order::new(7, n.clone(), Utc::now()))
            .await
            .unwrap();

        assert!(matches!(
            ledger.complete_order(&n, minor(500)).await,
            Err(LoyaltyError::NotFound(_))
        ));
        let order = ledger.find_order(&n).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::New);
    }

    #[tokio::test]
    async fn test_open_account_twice_keeps_balance() {
        let ledger = InMemoryLedger::new();
        ledger.open_account(1).await.unwrap();
        ledger.credit(1, minor(300)).await.unwrap();
        ledger.open_account(1).await.unwrap();
        assert_eq!(ledger.balance(1).await.unwrap().unwrap().current, minor(300));
        assert!(ledger.balance(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_withdraw_is_all_or_nothing() {
        let ledger = InMemoryLedger::new();
        ledger.open_account(1).await.unwrap();
        ledger.credit(1, minor(1000)).await.unwrap();

        let withdrawal = Withdrawal {
            user: 1,
            order: number("2377225624"),
            sum: minor(400),
            processed_at: Utc::now(),
        };
        let balance = ledger.withdraw(withdrawal.clone()).await.unwrap();
        assert_eq!(balance.current, minor(600));
        assert_eq!(balance.withdrawn, minor(400));

        let too_much = Withdrawal {
            sum: minor(601),
            ..withdrawal.clone()
        };
        assert!(matches!(
            ledger.withdraw(too_much).await,
            Err(LoyaltyError::InsufficientFunds)
        ));

        assert_eq!(ledger.withdrawals_for_user(1).await.unwrap(), vec![withdrawal]);
        assert_eq!(ledger.balance(1).await.unwrap().unwrap().current, minor(600));
    }
}
