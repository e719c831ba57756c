use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

/// Calculation status as reported by the accrual service.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "UPPERCASE")]
pub enum RemoteStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

/// What the accrual service answered for one order number.
#[derive(Debug, Clone, PartialEq)]
pub enum AccrualReply {
    /// The service has never heard of the order.
    NotRegistered,
    Registered,
    Processing,
    Invalid,
    /// Calculation finished. The reward is in currency units.
    Processed(Decimal),
    /// Too many requests: nothing may be sent before the pause elapses.
    RateLimited(Duration),
    /// 5xx from the service.
    Unavailable(u16),
}

#[derive(Debug, thiserror::Error)]
pub enum AccrualError {
    #[error("network error: {0}")]
    Network(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unexpected status: {0}")]
    UnexpectedStatus(u16),
}
