//! Application layer orchestrating the loyalty workflows.
//!
//! [`engine::LoyaltyEngine`] is the entry point. It owns the background
//! [`worker::AccrualWorker`], which takes order numbers from a bounded `tokio`
//! channel, and hands out the [`intake::OrderIntake`] and
//! [`withdrawal::WithdrawalService`] that front the shared ledger.

pub mod engine;
pub mod intake;
pub mod withdrawal;
pub mod worker;
