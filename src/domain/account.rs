use crate::domain::order_number::OrderNumber;
use crate::error::{LoyaltyError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type UserId = i64;

/// Number of minor units in one currency unit.
const MINOR_UNITS: i64 = 100;

/// A non-negative monetary value in minor units (cents).
///
/// The accrual service and the CLI speak decimal currency units; they are
/// converted once at the edge with [`Amount::from_currency`] so arithmetic on
/// balances stays exact.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn from_minor(minor: i64) -> Result<Self> {
        if minor >= 0 {
            Ok(Self(minor))
        } else {
            Err(LoyaltyError::ValidationError(
                "Amount must not be negative".to_string(),
            ))
        }
    }

    /// Converts a currency-unit decimal into minor units, rounding half away
    /// from zero to the nearest cent.
    pub fn from_currency(value: Decimal) -> Result<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(LoyaltyError::ValidationError(
                "Amount must not be negative".to_string(),
            ));
        }
        let scaled = value
            .checked_mul(Decimal::from(MINOR_UNITS))
            .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|v| v.to_i64())
            .ok_or_else(|| {
                LoyaltyError::ValidationError(format!("Amount {} is out of range", value))
            })?;
        Self::from_minor(scaled)
    }

    pub fn minor(&self) -> i64 {
        self.0
    }

    pub fn to_currency(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).filter(|v| *v >= 0).map(Self)
    }
}

impl TryFrom<i64> for Amount {
    type Error = LoyaltyError;

    fn try_from(minor: i64) -> Result<Self> {
        Self::from_minor(minor)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_currency())
    }
}

/// A user's loyalty balance.
///
/// `current` is what can still be spent, `withdrawn` is the running total of
/// everything spent so far. Neither can go below zero.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct UserBalance {
    pub user: UserId,
    pub current: Amount,
    pub withdrawn: Amount,
}

impl UserBalance {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            current: Amount::ZERO,
            withdrawn: Amount::ZERO,
        }
    }

    /// Adds an accrual to the spendable balance.
    pub fn credit(&mut self, amount: Amount) -> Result<()> {
        self.current = self.current.checked_add(amount).ok_or_else(|| {
            LoyaltyError::storage(format!("balance overflow for user {}", self.user))
        })?;
        Ok(())
    }

    /// Moves `amount` from current to withdrawn if current covers it.
    pub fn debit(&mut self, amount: Amount) -> Result<()> {
        let current = self
            .current
            .checked_sub(amount)
            .ok_or(LoyaltyError::InsufficientFunds)?;
        let withdrawn = self.withdrawn.checked_add(amount).ok_or_else(|| {
            LoyaltyError::storage(format!("withdrawn overflow for user {}", self.user))
        })?;
        self.current = current;
        self.withdrawn = withdrawn;
        Ok(())
    }
}

/// A spend of loyalty points against an order.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Withdrawal {
    pub user: UserId,
    pub order: OrderNumber,
    pub sum: Amount,
    pub processed_at: DateTime<Utc>,
}
