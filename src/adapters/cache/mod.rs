//! In-memory caching layer for hot-path reads.
//!
//! Uses `moka` for TTL-based concurrent caching. Services invalidate
//! entries after every write to the backing document.

pub mod moka_cache;

pub use moka_cache::MokaWeightCache;
