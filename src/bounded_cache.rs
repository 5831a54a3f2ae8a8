//! Bounded record of accepted nonces per chain.
//!
//! Lets the scanner tell an identical re-delivery of an already forwarded
//! event apart from a different submission claiming an accepted nonce.
//!
//! ## Recommended RAM
//!
//! - Each entry is a u64 key plus a submission id (~66 bytes for a 0x-prefixed
//!   32-byte hash), so 10k entries per chain ≈ 1 MB.
//! - When full, the lowest nonce is evicted first. Nonces below the evicted
//!   range fall back to plain ordering checks.

use std::collections::BTreeMap;
use std::env;

const DEFAULT_ACCEPTED_NONCE_CACHE_SIZE: usize = 10_000;

/// Read cache configuration from environment variables with defaults.
pub fn cache_size_from_env() -> usize {
    env::var("ACCEPTED_NONCE_CACHE_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&size: &usize| size > 0)
        .unwrap_or(DEFAULT_ACCEPTED_NONCE_CACHE_SIZE)
}

/// Nonce → submission id of recently accepted events.
///
/// - **Max capacity:** when full, the lowest nonce is evicted on insert.
pub struct AcceptedNonceCache {
    map: BTreeMap<u64, String>,
    max_size: usize,
}

impl AcceptedNonceCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            map: BTreeMap::new(),
            max_size: max_size.max(1),
        }
    }

    pub fn contains(&self, nonce: u64) -> bool {
        self.map.contains_key(&nonce)
    }

    /// Submission id accepted under `nonce`, if still cached
    pub fn submission_id(&self, nonce: u64) -> Option<&str> {
        self.map.get(&nonce).map(String::as_str)
    }

    pub fn insert(&mut self, nonce: u64, submission_id: String) {
        while self.map.len() >= self.max_size && !self.map.contains_key(&nonce) {
            if self.map.pop_first().is_none() {
                break;
            }
        }
        self.map.insert(nonce, submission_id);
    }
}
