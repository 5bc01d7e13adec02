//! Typed price cache on top of a key-value `Store`
//!
//! The cache holds the last successfully fetched price together with the epoch
//! millisecond timestamp of that fetch. Both values are written in one `set`
//! call so a reader never pairs a new price with an old timestamp.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use super::store::{Mapping, StorageError, Store};

/// Storage key for the cached price
pub const PRICE_KEY: &str = "price";

/// Storage key for the epoch-millisecond timestamp of the last successful fetch
pub const LAST_UPDATE_KEY: &str = "lastUpdate";

/// The last successfully fetched price and when it was fetched
///
/// Serializes to the stored document `{"price": .., "lastUpdate": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheEntry {
    /// Last known price
    pub price: f64,
    /// Epoch milliseconds of the fetch that produced `price`
    #[serde(rename = "lastUpdate")]
    pub last_update: i64,
}

impl CacheEntry {
    /// Milliseconds elapsed between the last update and `now_ms`
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.last_update)
    }

    /// The last update as a UTC timestamp, if it is representable
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.last_update)
    }
}

/// Reads and writes the `{price, lastUpdate}` pair through an injected `Store`
#[derive(Clone)]
pub struct PriceCache {
    store: Arc<dyn Store>,
}

impl fmt::Debug for PriceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriceCache").finish_non_exhaustive()
    }
}

impl PriceCache {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Reads the cached entry
    ///
    /// # Returns
    /// * `Ok(Some(CacheEntry))` if a finite numeric price is stored
    /// * `Ok(None)` if nothing usable is stored
    /// * `Err(StorageError)` if the backend could not be read
    ///
    /// A price stored without a timestamp is returned with `last_update = 0`,
    /// which makes it stale for any realistic clock.
    pub fn read(&self) -> Result<Option<CacheEntry>, StorageError> {
        let values = self.store.get(&[PRICE_KEY, LAST_UPDATE_KEY])?;

        let Some(price) = values
            .get(PRICE_KEY)
            .and_then(Value::as_f64)
            .filter(|p| p.is_finite())
        else {
            return Ok(None);
        };

        let last_update = values
            .get(LAST_UPDATE_KEY)
            .and_then(Value::as_i64)
            .unwrap_or(0);

        Ok(Some(CacheEntry { price, last_update }))
    }

    /// Persists `price` and `timestamp_ms` together in a single store write
    pub fn write(&self, price: f64, timestamp_ms: i64) -> Result<(), StorageError> {
        let entry = CacheEntry {
            price,
            last_update: timestamp_ms,
        };
        let values: Mapping = match serde_json::to_value(entry)? {
            Value::Object(values) => values,
            other => {
                return Err(StorageError::Unavailable(format!(
                    "cache entry serialized to {} instead of an object",
                    other
                )))
            }
        };
        self.store.set(values)
    }
}
