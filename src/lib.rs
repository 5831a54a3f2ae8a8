//! Relay ingest - Library interface
//!
//! Re-exports internal modules for use in integration tests.

pub mod announce;
pub mod api;
pub mod bounded_cache;
pub mod clients;
pub mod config;
pub mod metrics;
pub mod nonce;
pub mod providers;
pub mod recovery;
pub mod scanner;
pub mod types;
