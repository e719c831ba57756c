use crate::config::WorkerConfig;
use crate::domain::account::Amount;
use crate::domain::accrual::{AccrualError, AccrualReply};
use crate::domain::order::{OrderStatus, StatusChange};
use crate::domain::order_number::OrderNumber;
use crate::domain::ports::{AccrualSourceBox, LedgerArc, OrderLedger};
use crate::error::{LoyaltyError, Result};
use std::collections::{HashMap, HashSet};
use std::future::poll_fn;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tokio_util::time::DelayQueue;
use tracing::{debug, error, info, warn};

/// Producer side of the worker's bounded intake queue.
#[derive(Clone)]
pub struct AccrualQueue {
    sender: mpsc::Sender<OrderNumber>,
}

impl AccrualQueue {
    /// Hands an order number to the worker, waiting while the queue is full.
    pub async fn enqueue(&self, number: OrderNumber) -> Result<()> {
        self.sender
            .send(number)
            .await
            .map_err(|_| LoyaltyError::WorkerStopped)
    }
}

/// Longest cooldown honoured from a `Retry-After`; keeps timer arithmetic in range.
const MAX_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

/// What to do with an order number after one poll.
#[derive(Debug, PartialEq)]
enum Step {
    /// Terminal, or nothing left to do.
    Done,
    /// Poll again after the delay.
    Retry(Duration),
    /// The poll or the ledger update failed; back off.
    Failed,
}

enum Next {
    Fresh(OrderNumber),
    Retry(OrderNumber),
    IntakeClosed,
    Stop,
}

/// Polls the accrual service for queued orders and settles their outcome.
///
/// Numbers arrive through the bounded [`AccrualQueue`]. Orders the service is
/// still working on are parked in a timer queue owned by the worker and
/// polled again once their delay has elapsed, so the worker never feeds its
/// own bounded queue. A single loop handles one number at a time, which keeps
/// status transitions of an order serialized.
///
/// A 429 from the service arms a cooldown that holds back every poll, not only
/// the one that was throttled.
pub struct AccrualWorker {
    ledger: LedgerArc,
    source: AccrualSourceBox,
    config: WorkerConfig,
    receiver: mpsc::Receiver<OrderNumber>,
    retries: DelayQueue<OrderNumber>,
    /// Numbers currently parked in `retries`.
    parked: HashSet<OrderNumber>,
    /// Consecutive failures per number, for the backoff.
    failures: HashMap<OrderNumber, u32>,
    cooldown_until: Option<Instant>,
}

/// Creates a worker and the queue feeding it.
pub fn accrual_channel(
    ledger: LedgerArc,
    source: AccrualSourceBox,
    config: WorkerConfig,
) -> (AccrualQueue, AccrualWorker) {
    let (sender, receiver) = mpsc::channel(config.queue_capacity);
    let worker = AccrualWorker {
        ledger,
        source,
        config,
        receiver,
        retries: DelayQueue::new(),
        parked: HashSet::new(),
        failures: HashMap::new(),
        cooldown_until: None,
    };
    (AccrualQueue { sender }, worker)
}

impl AccrualWorker {
    /// Main loop. Returns once `shutdown` is cancelled, or once the queue is
    /// closed and nothing is left to retry. A poll already in flight when
    /// shutdown is requested is finished first.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Accrual worker started");
        let mut intake_open = true;

        loop {
            if let Some(until) = self.cooldown_until.take() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = sleep_until(until) => {
                        debug!("Accrual cooldown elapsed");
                    }
                }
            }

            if !intake_open && self.retries.is_empty() {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Next::Stop,
                Some(expired) = poll_fn(|cx| self.retries.poll_expired(cx)), if !self.retries.is_empty() => {
                    Next::Retry(expired.into_inner())
                }
                received = self.receiver.recv(), if intake_open => match received {
                    Some(number) => Next::Fresh(number),
                    None => Next::IntakeClosed,
                },
            };

            match next {
                Next::Fresh(number) => {
                    // Already waiting for its retry; the parked entry will poll it.
                    if self.parked.contains(&number) {
                        debug!(order = %number, "Order already scheduled, skipping");
                        continue;
                    }
                    self.poll(number).await;
                }
                Next::Retry(number) => {
                    self.parked.remove(&number);
                    self.poll(number).await;
                }
                Next::IntakeClosed => {
                    debug!("Accrual queue closed");
                    intake_open = false;
                }
                Next::Stop => break,
            }
        }

        info!(pending = self.parked.len(), "Accrual worker stopped");
    }

    async fn poll(&mut self, number: OrderNumber) {
        let step = self.process(&number).await;
        match step {
            Step::Done => {
                self.failures.remove(&number);
            }
            Step::Retry(delay) => {
                self.failures.remove(&number);
                self.park(number, delay);
            }
            Step::Failed => {
                let failures = self.failures.entry(number.clone()).or_insert(0);
                *failures = failures.saturating_add(1);
                let delay = self.config.backoff_for(*failures);
                self.park(number, delay);
            }
        }
    }

    fn park(&mut self, number: OrderNumber, delay: Duration) {
        if self.parked.insert(number.clone()) {
            self.retries.insert(number, delay);
        }
    }

    async fn process(&mut self, number: &OrderNumber) -> Step {
        match self.ledger.find_order(number).await {
            Ok(Some(order)) if order.status.is_terminal() => {
                debug!(order = %number, status = %order.status, "Order already settled");
                return Step::Done;
            }
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(order = %number, "Queued order is not in the ledger, dropping");
                return Step::Done;
            }
            Err(e) => {
                error!(order = %number, "Failed to load order: {}", e);
                return Step::Failed;
            }
        }

        let reply = self.source.query(number).await;
        self.settle(number, reply).await
    }

    async fn settle(
        &mut self,
        number: &OrderNumber,
        reply: std::result::Result<AccrualReply, AccrualError>,
    ) -> Step {
        match reply {
            Ok(AccrualReply::NotRegistered) => {
                debug!(order = %number, "Order not known to the accrual service yet");
                Step::Retry(self.config.retry_delay)
            }
            Ok(AccrualReply::Registered) => self
                .advance(number, OrderStatus::Registered)
                .await
                .map_or(Step::Failed, |_| Step::Retry(self.config.retry_delay)),
            Ok(AccrualReply::Processing) => self
                .advance(number, OrderStatus::Processing)
                .await
                .map_or(Step::Failed, |_| Step::Retry(self.config.retry_delay)),
            Ok(AccrualReply::Invalid) => self
                .advance(number, OrderStatus::Invalid)
                .await
                .map_or(Step::Failed, |_| Step::Done),
            Ok(AccrualReply::Processed(reward)) => {
                let accrual = match Amount::from_currency(reward) {
                    Ok(accrual) => accrual,
                    Err(e) => {
                        warn!(order = %number, "Unusable accrual {}: {}", reward, e);
                        return Step::Failed;
                    }
                };
                self.complete(number, accrual).await
            }
            Ok(AccrualReply::RateLimited(pause)) => {
                let pause = pause.min(MAX_COOLDOWN);
                warn!(
                    order = %number,
                    "Accrual service is throttling, pausing polls for {}s",
                    pause.as_secs()
                );
                self.cooldown_until = Some(Instant::now() + pause);
                Step::Retry(pause)
            }
            Ok(AccrualReply::Unavailable(code)) => {
                warn!(order = %number, "Accrual service internal error (HTTP {})", code);
                Step::Failed
            }
            Err(e) => {
                warn!(order = %number, "Accrual request failed: {}", e);
                Step::Failed
            }
        }
    }

    async fn advance(&self, number: &OrderNumber, status: OrderStatus) -> Result<StatusChange> {
        let change = self
            .ledger
            .advance_status(number, status)
            .await
            .inspect_err(|e| error!(order = %number, "Failed to set status {}: {}", status, e))?;
        if change == StatusChange::Applied {
            debug!(order = %number, %status, "Order status updated");
        }
        Ok(change)
    }

    async fn complete(&self, number: &OrderNumber, accrual: Amount) -> Step {
        match self.ledger.complete_order(number, accrual).await {
            Ok(StatusChange::Applied) => {
                info!(order = %number, %accrual, "Order processed, accrual credited");
                Step::Done
            }
            Ok(StatusChange::Unchanged) => {
                debug!(order = %number, "Order was already settled");
                Step::Done
            }
            Err(e) => {
                error!(order = %number, "Failed to settle accrual: {}", e);
                Step::Failed
            }
        }
    }
}
