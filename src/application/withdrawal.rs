use crate::domain::account::{Amount, UserBalance, UserId, Withdrawal};
use crate::domain::order_number::OrderNumber;
use crate::domain::ports::{BalanceLedger, LedgerArc};
use crate::error::{LoyaltyError, Result};
use chrono::Utc;
use tracing::info;

/// Balance queries and spending of loyalty points.
#[derive(Clone)]
pub struct WithdrawalService {
    ledger: LedgerArc,
}

impl WithdrawalService {
    pub fn new(ledger: LedgerArc) -> Self {
        Self { ledger }
    }

    /// Opens a zero balance for a newly registered user.
    pub async fn open_account(&self, user: UserId) -> Result<()> {
        self.ledger.open_account(user).await
    }

    pub async fn balance(&self, user: UserId) -> Result<UserBalance> {
        self.ledger
            .balance(user)
            .await?
            .ok_or_else(|| LoyaltyError::NotFound(format!("account of user {}", user)))
    }

    /// Spends `sum` of `user`'s points against `order`.
    ///
    /// The order number is validated like an upload but does not have to be
    /// a known order. The record and the debit are written together; a sum
    /// above the current balance is refused with nothing written.
    pub async fn withdraw(&self, user: UserId, order: &str, sum: Amount) -> Result<Withdrawal> {
        let order = OrderNumber::parse(order)?;
        if sum.is_zero() {
            return Err(LoyaltyError::ValidationError(
                "Withdrawal sum must be positive".to_string(),
            ));
        }

        let balance = self.balance(user).await?;
        if sum > balance.current {
            return Err(LoyaltyError::InsufficientFunds);
        }

        let withdrawal = Withdrawal {
            user,
            order,
            sum,
            processed_at: Utc::now(),
        };
        // The ledger checks the balance again inside its transaction, so a
        // concurrent withdrawal cannot overdraw between the read and here.
        let balance = self.ledger.withdraw(withdrawal.clone()).await?;
        info!(user, order = %withdrawal.order, %sum, current = %balance.current, "Withdrawal recorded");

        Ok(withdrawal)
    }

    /// Withdrawals of `user`, oldest first.
    pub async fn list_withdrawals(&self, user: UserId) -> Result<Vec<Withdrawal>> {
        self.ledger.withdrawals_for_user(user).await
    }
}
