//! HTTP client for the external accrual service.
//!
//! `GET {base}/api/orders/{number}` answers with
//! - 200 and `{"order", "status", "accrual"?}`,
//! - 204 when the order is unknown to the service,
//! - 429 with `Retry-After` (seconds) when we are polling too fast,
//! - 500 when the service itself failed.

use crate::domain::accrual::{AccrualError, AccrualReply, RemoteStatus};
use crate::domain::order_number::OrderNumber;
use crate::domain::ports::AccrualSource;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct AccrualResponse {
    status: RemoteStatus,
    #[serde(default)]
    accrual: Option<Decimal>,
}

pub struct HttpAccrualClient {
    client: Client,
    base_url: String,
    default_rate_limit: Duration,
}

impl HttpAccrualClient {
    /// Create a client for the service at `base_url`
    /// (e.g. "http://localhost:8081"). A missing scheme defaults to http.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        default_rate_limit: Duration,
    ) -> Result<Self, AccrualError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AccrualError::Network(e.to_string()))?;

        let base_url = base_url.trim_end_matches('/');
        let base_url = if base_url.contains("://") {
            base_url.to_string()
        } else {
            format!("http://{}", base_url)
        };

        Ok(Self {
            client,
            base_url,
            default_rate_limit,
        })
    }

    fn retry_after(&self, headers: &header::HeaderMap) -> Duration {
        headers
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.default_rate_limit)
    }
}

#[async_trait]
impl AccrualSource for HttpAccrualClient {
    async fn query(&self, number: &OrderNumber) -> Result<AccrualReply, AccrualError> {
        let response = self
            .client
            .get(format!("{}/api/orders/{}", self.base_url, number))
            .send()
            .await
            .map_err(|e| AccrualError::Network(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let body: AccrualResponse = response
                    .json()
                    .await
                    .map_err(|e| AccrualError::Parse(e.to_string()))?;
                match body.status {
                    RemoteStatus::Registered => Ok(AccrualReply::Registered),
                    RemoteStatus::Processing => Ok(AccrualReply::Processing),
                    RemoteStatus::Invalid => Ok(AccrualReply::Invalid),
                    RemoteStatus::Processed => Ok(AccrualReply::Processed(
                        body.accrual.unwrap_or(Decimal::ZERO),
                    )),
                }
            }
            StatusCode::NO_CONTENT => Ok(AccrualReply::NotRegistered),
            StatusCode::TOO_MANY_REQUESTS => {
                Ok(AccrualReply::RateLimited(self.retry_after(response.headers())))
            }
            status if status.is_server_error() => Ok(AccrualReply::Unavailable(status.as_u16())),
            status => Err(AccrualError::UnexpectedStatus(status.as_u16())),
        }
    }
}
