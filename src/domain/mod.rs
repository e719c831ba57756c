//! Domain types and the ports the application layer is written against.

pub mod account;
pub mod accrual;
pub mod order;
pub mod order_number;
pub mod ports;
