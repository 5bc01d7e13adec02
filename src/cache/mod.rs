//! Persistent price cache
//!
//! The cache stores the last successfully fetched price and the epoch
//! millisecond timestamp of that fetch under the fixed keys `"price"` and
//! `"lastUpdate"`. The storage backend is injected through the `Store` trait so
//! the file-backed store can be swapped for an in-memory one.

mod manager;
mod store;

pub use manager::{CacheEntry, PriceCache, LAST_UPDATE_KEY, PRICE_KEY};
pub use store::{FileStore, Mapping, MemoryStore, StorageError, Store};
