//! Core types and shared functionality for scrapegate.
//!
//! This crate provides:
//! - Read-through response cache (TTL + LRU, in memory)
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheOptions, MAX_TTL_MINUTES, Payload, ResponseCache, ResponseType};
pub use config::{AppConfig, ConfigError, MAX_RETRIES_LIMIT, MIN_RPS};
pub use error::Error;
