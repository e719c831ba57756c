use super::intake::OrderIntake;
use super::withdrawal::WithdrawalService;
use super::worker::accrual_channel;
use crate::config::WorkerConfig;
use crate::domain::ports::{AccrualSourceBox, LedgerArc, OrderLedger};
use crate::error::Result;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How often [`LoyaltyEngine::drain`] looks at the ledger.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The main entry point of the loyalty backend.
///
/// `LoyaltyEngine` wires order intake, withdrawals and the background accrual
/// worker over one ledger. It owns the worker task and the token that stops
/// it, so independent engines can run side by side (e.g. in tests).
pub struct LoyaltyEngine {
    ledger: LedgerArc,
    intake: OrderIntake,
    withdrawals: WithdrawalService,
    shutdown: CancellationToken,
    worker: JoinHandle<()>,
}

impl LoyaltyEngine {
    /// Starts the accrual worker and re-queues every order the ledger still
    /// holds in a non-terminal state (left over from a previous run).
    ///
    /// # Arguments
    ///
    /// * `ledger` - Store of orders, balances and withdrawals.
    /// * `source` - The accrual service.
    /// * `config` - Worker tuning.
    pub async fn start(
        ledger: LedgerArc,
        source: AccrualSourceBox,
        config: WorkerConfig,
    ) -> Result<Self> {
        // Nothing is spawned until the backlog has been read.
        let pending = ledger.pending_orders().await?;

        let (queue, worker) = accrual_channel(ledger.clone(), source, config);
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(worker.run(shutdown.clone()));

        if !pending.is_empty() {
            info!(count = pending.len(), "Resuming accrual of pending orders");
            // The queue is bounded; feed it from a task so start-up does not
            // wait for the backlog to fit.
            let queue = queue.clone();
            let token = shutdown.clone();
            tokio::spawn(async move {
                for order in pending {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        sent = queue.enqueue(order.number) => {
                            if sent.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }

        Ok(Self {
            intake: OrderIntake::new(ledger.clone(), queue),
            withdrawals: WithdrawalService::new(ledger.clone()),
            ledger,
            shutdown,
            worker,
        })
    }

    pub fn intake(&self) -> &OrderIntake {
        &self.intake
    }

    pub fn withdrawals(&self) -> &WithdrawalService {
        &self.withdrawals
    }

    pub fn ledger(&self) -> &LedgerArc {
        &self.ledger
    }

    /// Waits until every order has reached a terminal state or `timeout`
    /// elapses. Returns whether the ledger was fully settled.
    pub async fn drain(&self, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.ledger.pending_orders().await?.is_empty() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }

    /// Stops the worker and waits for it. A poll in flight is finished;
    /// orders still pending stay in the ledger and resume on the next start.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        if let Err(e) = self.worker.await {
            warn!("Accrual worker ended abnormally: {}", e);
        }
        Ok(())
    }
}
