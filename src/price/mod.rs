//! Remote price sources
//!
//! A `PriceSource` returns a single spot price for one asset in one fiat
//! currency. Failures are split into transient network failures, which the
//! scheduler retries once, and application-level failures, which it does not.

pub mod coingecko;

pub use coingecko::CoinGeckoClient;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when fetching a price
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The request could not be dispatched or completed (DNS, connect, reset)
    #[error("network request failed: {0}")]
    Network(String),

    /// The remote answered with a non-success status
    #[error("remote responded with HTTP {0}")]
    Status(u16),

    /// The response body did not contain a usable price
    #[error("malformed price payload: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Whether the failure is worth retrying after a short delay
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network(_))
    }
}

/// A remote source of a single exchange rate
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Issues one request and returns the current price
    async fn fetch_price(&self) -> Result<f64, FetchError>;
}
