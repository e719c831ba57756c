//! Loyalty points backend: order intake, accrual polling and withdrawals.
//!
//! The crate follows a ports-and-adapters layout. `domain` holds the model and
//! the storage/accrual ports, `application` the services and the background
//! accrual worker, `infrastructure` the ledger and HTTP adapters, and
//! `interfaces` the CSV driver used by the binary.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod telemetry;
#[cfg(test)]
mod test_utils;
