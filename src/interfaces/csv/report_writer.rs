use crate::domain::account::{Amount, UserBalance};
use crate::domain::order::Order;
use crate::error::Result;
use std::io::Write;

/// Writes the final state as two CSV sections: balances, then orders.
///
/// Amounts are printed in currency units without trailing zeros.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

fn currency(amount: Amount) -> String {
    amount.to_currency().normalize().to_string()
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(sink);
        Self { writer }
    }

    /// `user,current,withdrawn`, one row per balance.
    pub fn write_balances(&mut self, balances: &[UserBalance]) -> Result<()> {
        self.writer.write_record(["user", "current", "withdrawn"])?;
        for balance in balances {
            self.writer.write_record([
                balance.user.to_string(),
                currency(balance.current),
                currency(balance.withdrawn),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// `user,order,status,accrual`, one row per order.
    pub fn write_orders(&mut self, orders: &[Order]) -> Result<()> {
        self.writer
            .write_record(["user", "order", "status", "accrual"])?;
        for order in orders {
            self.writer.write_record([
                order.user.to_string(),
                order.number.to_string(),
                order.status.to_string(),
                currency(order.accrual),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
