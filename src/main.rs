use clap::Parser;
use loyalty_engine::application::engine::LoyaltyEngine;
use loyalty_engine::config::WorkerConfig;
use loyalty_engine::domain::account::Amount;
use loyalty_engine::domain::ports::{BalanceLedger, LedgerArc, OrderLedger};
use loyalty_engine::error::Outcome;
use loyalty_engine::infrastructure::accrual_http::HttpAccrualClient;
use loyalty_engine::infrastructure::in_memory::InMemoryLedger;
#[cfg(feature = "storage-rocksdb")]
use loyalty_engine::infrastructure::rocksdb::RocksDbLedger;
use loyalty_engine::interfaces::csv::command_reader::{Command, CommandReader, CommandType};
use loyalty_engine::interfaces::csv::report_writer::ReportWriter;
use loyalty_engine::telemetry;
use miette::{IntoDiagnostic, Result};
use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input commands CSV file (`type, user, order, sum`)
    input: PathBuf,

    /// Base address of the accrual service.
    #[arg(long, env = "ACCRUAL_SYSTEM_ADDRESS", default_value = "http://localhost:8081")]
    accrual_address: String,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "DATABASE_PATH")]
    db_path: Option<PathBuf>,

    /// Capacity of the accrual queue.
    #[arg(long, default_value_t = 64)]
    queue_capacity: usize,

    /// Seconds to wait for pending accruals before printing the report.
    #[arg(long, default_value_t = 30)]
    drain_timeout: u64,

    /// Timeout in seconds of one request to the accrual service.
    #[arg(long, default_value_t = 10)]
    request_timeout: u64,
}

fn open_ledger(db_path: Option<PathBuf>) -> Result<LedgerArc> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => Ok(Arc::new(RocksDbLedger::open(path).into_diagnostic()?)),
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryLedger::new()))
        }
        None => Ok(Arc::new(InMemoryLedger::new())),
    }
}

async fn execute(engine: &LoyaltyEngine, command: &Command) -> loyalty_engine::error::Result<Outcome> {
    match command.r#type {
        CommandType::Open => {
            engine.withdrawals().open_account(command.user).await?;
            Ok(Outcome::Success)
        }
        CommandType::Upload => {
            let admission = engine
                .intake()
                .submit_order(command.user, command.require_order()?)
                .await?;
            Ok(admission.outcome())
        }
        CommandType::Withdraw => {
            let sum = Amount::from_currency(command.require_sum()?)?;
            engine
                .withdrawals()
                .withdraw(command.user, command.require_order()?, sum)
                .await?;
            Ok(Outcome::Success)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();
    let cli = Cli::parse();

    let config = WorkerConfig::default()
        .with_queue_capacity(cli.queue_capacity)
        .with_request_timeout(Duration::from_secs(cli.request_timeout));
    let source = HttpAccrualClient::new(
        &cli.accrual_address,
        config.request_timeout,
        config.default_rate_limit,
    )
    .into_diagnostic()?;
    let ledger = open_ledger(cli.db_path)?;
    let engine = LoyaltyEngine::start(ledger.clone(), Box::new(source), config)
        .await
        .into_diagnostic()?;

    // Process commands
    let file = File::open(cli.input).into_diagnostic()?;
    let mut users = BTreeSet::new();
    for row in CommandReader::new(file).commands() {
        match row {
            Ok(command) => {
                users.insert(command.user);
                match execute(&engine, &command).await {
                    Ok(outcome) => {
                        info!(user = command.user, kind = ?command.r#type, ?outcome, status = outcome.http_status(), "Command handled");
                    }
                    Err(e) => {
                        let outcome = e.outcome();
                        warn!(user = command.user, kind = ?command.r#type, ?outcome, status = outcome.http_status(), "Command rejected");
                        eprintln!("Error processing command: {}", e);
                    }
                }
            }
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    let settled = engine
        .drain(Duration::from_secs(cli.drain_timeout))
        .await
        .into_diagnostic()?;
    if !settled {
        warn!("Some orders are still awaiting accrual; they resume on the next run");
    }
    engine.shutdown().await.into_diagnostic()?;

    // Collect final state of the users seen in the input
    let mut balances = Vec::new();
    let mut orders = Vec::new();
    for user in users {
        if let Some(balance) = ledger.balance(user).await.into_diagnostic()? {
            balances.push(balance);
        }
        orders.extend(ledger.orders_for_user(user).await.into_diagnostic()?);
    }

    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());
    writer.write_balances(&balances).into_diagnostic()?;
    writer.write_orders(&orders).into_diagnostic()?;

    Ok(())
}
