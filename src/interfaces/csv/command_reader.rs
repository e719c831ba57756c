use crate::domain::account::UserId;
use crate::error::{LoyaltyError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    /// Register a user with a zero balance.
    Open,
    /// Upload an order number for accrual.
    Upload,
    /// Spend points against an order number.
    Withdraw,
}

/// One row of the command file: `type, user, order, sum`.
///
/// `order` is required by `upload` and `withdraw`, `sum` only by `withdraw`.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Command {
    pub r#type: CommandType,
    pub user: UserId,
    pub order: Option<String>,
    pub sum: Option<Decimal>,
}

impl Command {
    pub fn require_order(&self) -> Result<&str> {
        self.order
            .as_deref()
            .ok_or_else(|| LoyaltyError::ValidationError("Missing order number".to_string()))
    }

    pub fn require_sum(&self) -> Result<Decimal> {
        self.sum
            .ok_or_else(|| LoyaltyError::ValidationError("Missing sum".to_string()))
    }
}

/// Reads commands from a CSV source.
///
/// This reader wraps `csv::Reader` and provides an iterator over `Result<Command>`.
/// It trims whitespace and accepts rows that leave trailing columns out.
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    /// Creates a new `CommandReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and deserializes commands, one row at a time.
    pub fn commands(self) -> impl Iterator<Item = Result<Command>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(LoyaltyError::from))
    }
}
