//! CoinGecko simple-price API client
//!
//! Fetches `GET <endpoint>?ids=<asset>&vs_currencies=<fiat>` and extracts the
//! numeric price from a body shaped like `{"monero": {"usd": 187.32}}`.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::{FetchError, PriceSource};

/// Default CoinGecko simple-price endpoint
pub const COINGECKO_SIMPLE_PRICE_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

/// Client for fetching one asset's price from the CoinGecko API
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    client: Client,
    endpoint: String,
    asset: String,
    fiat: String,
}

impl Default for CoinGeckoClient {
    fn default() -> Self {
        Self::new("monero", "usd")
    }
}

impl CoinGeckoClient {
    /// Create a client for `asset` priced in `fiat` against the public endpoint
    pub fn new(asset: impl Into<String>, fiat: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: COINGECKO_SIMPLE_PRICE_URL.to_string(),
            asset: asset.into(),
            fiat: fiat.into(),
        }
    }

    /// Use a custom HTTP client (timeouts, proxies)
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Use a different base endpoint (mirrors, proxies, local test servers)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Full request URL including the query string
    pub fn url(&self) -> String {
        format!(
            "{}?ids={}&vs_currencies={}",
            self.endpoint, self.asset, self.fiat
        )
    }

    /// Extract `<asset>.<fiat>` from a response body
    fn parse_price(&self, body: &[u8]) -> Result<f64, FetchError> {
        let json: Value = serde_json::from_slice(body)
            .map_err(|e| FetchError::Malformed(format!("invalid JSON: {}", e)))?;

        let price = json
            .get(&self.asset)
            .and_then(|quotes| quotes.get(&self.fiat))
            .ok_or_else(|| {
                FetchError::Malformed(format!("missing field {}.{}", self.asset, self.fiat))
            })?
            .as_f64()
            .ok_or_else(|| {
                FetchError::Malformed(format!("{}.{} is not a number", self.asset, self.fiat))
            })?;

        if !price.is_finite() {
            return Err(FetchError::Malformed(format!("non-finite price {}", price)));
        }

        Ok(price)
    }
}

#[async_trait]
impl PriceSource for CoinGeckoClient {
    async fn fetch_price(&self) -> Result<f64, FetchError> {
        let url = self.url();
        debug!(%url, "requesting price");

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        debug!(status = status.as_u16(), "price response received");
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        // A body cut off mid-transfer is still a network failure
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        self.parse_price(&body)
    }
}
