use std::time::Duration;

/// Tuning knobs of the accrual worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Capacity of the intake queue. Intake waits once it is full.
    pub queue_capacity: usize,

    /// Pause before re-polling an order the service is still working on.
    pub retry_delay: Duration,

    /// First pause after a failed poll. Doubles per consecutive failure.
    pub error_backoff: Duration,

    /// Upper bound for the failure backoff.
    pub max_backoff: Duration,

    /// Pause used when a 429 carries no usable `Retry-After`.
    pub default_rate_limit: Duration,

    /// Timeout of a single request to the accrual service.
    pub request_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            retry_delay: Duration::from_secs(1),
            error_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            default_rate_limit: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl WorkerConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration, max: Duration) -> Self {
        self.error_backoff = backoff;
        self.max_backoff = max.max(backoff);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Backoff after `failures` consecutive failed polls of one order.
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1).min(16));
        self.error_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}
