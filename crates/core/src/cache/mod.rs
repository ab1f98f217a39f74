//! In-memory read-through cache for route responses.
//!
//! This module provides a process-local cache built on moka. It supports:
//!
//! - Keys derived from the normalized path and sorted query string
//! - Per-entry TTL chosen by each endpoint
//! - A maximum entry count with least-recently-used eviction
//! - Storing only explicitly successful payloads

pub mod key;
pub mod response;

pub use key::{cache_key, cache_key_from_pairs};
pub use response::{
    CacheOptions, CachedResponse, DEFAULT_TTL, MAX_TTL, MAX_TTL_MINUTES, Payload, ResponseCache, ResponseType,
};
