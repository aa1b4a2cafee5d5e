//! Content-addressed result caching.
//!
//! Maps a request [`Fingerprint`](lumiere_core::Fingerprint) to the asset a
//! previous generation produced, so identical requests are never paid for
//! twice.

#![warn(missing_docs)]

mod cache;

pub use cache::{CacheRecord, ResultCache, ResultCacheConfig, ResultCacheConfigBuilder};
