use crate::error::{LoyaltyError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Returns true iff `s` is non-empty and made of ASCII decimal digits only.
pub fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Standard Luhn checksum.
///
/// Digits sharing the parity of the string length (counted from the left) are
/// doubled, which is every second digit moving left from the check digit.
/// Non-digit input is never valid.
pub fn luhn_valid(s: &str) -> bool {
    if !is_numeric(s) {
        return false;
    }

    let parity = s.len() % 2;
    let sum: u32 = s
        .bytes()
        .enumerate()
        .map(|(i, b)| {
            let mut digit = u32::from(b - b'0');
            if i % 2 == parity {
                digit *= 2;
                if digit > 9 {
                    digit -= 9;
                }
            }
            digit
        })
        .sum();

    sum % 10 == 0
}

/// An order number that passed both the format and the checksum check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    /// Validates a raw order number.
    ///
    /// The format check runs first so a string that is both non-numeric and
    /// checksum-invalid is reported as a format error.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if !is_numeric(raw) {
            return Err(LoyaltyError::InvalidFormat);
        }
        if !luhn_valid(raw) {
            return Err(LoyaltyError::InvalidChecksum);
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = LoyaltyError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}
