//! Decision Cache: maps a normalized event fingerprint to a previously
//! computed hotel recommendation.

pub mod decision;
pub mod fingerprint;

pub use decision::{CacheEntry, CacheLookup, CacheStore, DecisionCache, SqliteCacheStore};
pub use fingerprint::{hotel_request_context, Fingerprint};
