//! Per-chain scan state
//!
//! [`ChainStatus`] is the small shared handle the operator API can read and
//! flip (pause flag, published last nonce). [`ChainScanState`] is owned by the
//! chain's scanner task and is the only writer of the last accepted nonce.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::bounded_cache::AcceptedNonceCache;
use crate::types::{ChainId, ScanState};

#[derive(Debug)]
pub struct ChainStatus {
    chain_id: ChainId,
    name: String,
    paused: AtomicBool,
    progress: Mutex<Progress>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Progress {
    last_nonce: Option<u64>,
    last_accepted_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of a chain for the operator API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStatusSnapshot {
    pub chain_id: ChainId,
    pub name: String,
    pub state: ScanState,
    pub last_nonce: Option<u64>,
    pub last_accepted_at: Option<DateTime<Utc>>,
}

impl ChainStatus {
    pub fn new(chain_id: ChainId, name: impl Into<String>) -> Self {
        Self {
            chain_id,
            name: name.into(),
            paused: AtomicBool::new(false),
            progress: Mutex::new(Progress::default()),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ScanState {
        if self.paused.load(Ordering::SeqCst) {
            ScanState::Paused
        } else {
            ScanState::Active
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Returns true when the chain was active before
    pub fn pause(&self) -> bool {
        !self.paused.swap(true, Ordering::SeqCst)
    }

    /// Returns true when the chain was paused before
    pub fn resume(&self) -> bool {
        self.paused.swap(false, Ordering::SeqCst)
    }

    fn progress(&self) -> Progress {
        match self.progress.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn last_nonce(&self) -> Option<u64> {
        self.progress().last_nonce
    }

    fn publish_nonce(&self, nonce: u64) {
        let progress = Progress {
            last_nonce: Some(nonce),
            last_accepted_at: Some(Utc::now()),
        };
        match self.progress.lock() {
            Ok(mut guard) => *guard = progress,
            Err(poisoned) => *poisoned.into_inner() = progress,
        }
    }

    pub fn snapshot(&self) -> ChainStatusSnapshot {
        let progress = self.progress();
        ChainStatusSnapshot {
            chain_id: self.chain_id,
            name: self.name.clone(),
            state: self.state(),
            last_nonce: progress.last_nonce,
            last_accepted_at: progress.last_accepted_at,
        }
    }
}

/// Nonce bookkeeping owned by one chain's scanner
pub struct ChainScanState {
    last_nonce: Option<u64>,
    accepted: AcceptedNonceCache,
    status: Arc<ChainStatus>,
}

impl ChainScanState {
    pub fn new(status: Arc<ChainStatus>, cache_size: usize) -> Self {
        Self {
            last_nonce: status.last_nonce(),
            accepted: AcceptedNonceCache::new(cache_size),
            status,
        }
    }

    pub fn last_nonce(&self) -> Option<u64> {
        self.last_nonce
    }

    pub fn status(&self) -> &Arc<ChainStatus> {
        &self.status
    }

    /// Same submission already accepted under the same nonce
    pub fn is_redelivery(&self, nonce: u64, submission_id: &str) -> bool {
        self.accepted.submission_id(nonce) == Some(submission_id)
    }

    /// Whether `nonce` has already been accepted and must be checked for duplicates
    pub fn needs_duplicate_check(&self, nonce: u64) -> bool {
        self.accepted.contains(nonce)
    }

    /// Record an accepted event. Only called after a `Success` classification.
    pub fn advance(&mut self, nonce: u64, submission_id: &str) {
        self.last_nonce = Some(nonce);
        self.accepted.insert(nonce, submission_id.to_string());
        self.status.publish_nonce(nonce);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_and_resume_are_idempotent() {
        let status = ChainStatus::new(97, "bsc-testnet");
        assert_eq!(status.state(), ScanState::Active);
        assert!(status.pause());
        assert!(!status.pause());
        assert_eq!(status.state(), ScanState::Paused);
        assert!(status.resume());
        assert!(!status.resume());
        assert_eq!(status.state(), ScanState::Active);
    }

    #[test]
    fn test_advance_publishes_nonce() {
        let status = Arc::new(ChainStatus::new(97, "bsc-testnet"));
        let mut state = ChainScanState::new(status.clone(), 100);
        assert_eq!(state.last_nonce(), None);
        assert_eq!(status.last_nonce(), None);

        state.advance(0, "0xa");
        assert_eq!(state.last_nonce(), Some(0));
        assert_eq!(status.last_nonce(), Some(0));
        assert_eq!(status.snapshot().last_nonce, Some(0));
        assert!(status.snapshot().last_accepted_at.is_some());
    }

    #[test]
    fn test_redelivery_vs_duplicate() {
        let status = Arc::new(ChainStatus::new(1, "eth"));
        let mut state = ChainScanState::new(status, 100);
        state.advance(0, "0xa");

        assert!(state.is_redelivery(0, "0xa"));
        assert!(!state.is_redelivery(0, "0xb"));
        assert!(state.needs_duplicate_check(0));
        assert!(!state.needs_duplicate_check(1));
    }

    #[test]
    fn test_snapshot_serializes() {
        let status = ChainStatus::new(56, "bsc");
        status.pause();
        let value = serde_json::to_value(status.snapshot()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "chainId": 56,
                "name": "bsc",
                "state": "paused",
                "lastNonce": null,
                "lastAcceptedAt": null
            })
        );
    }
}
