use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::state::{ChainStatus, ChainStatusSnapshot};
use crate::types::ChainId;

/// Pauses and resumes chain scanning. All operations are idempotent.
///
/// `pause` and `resume` return true only when the state actually changed.
pub trait ScanController: Send + Sync {
    fn pause(&self, chain_id: ChainId) -> bool;
    fn resume(&self, chain_id: ChainId) -> bool;
    fn is_paused(&self, chain_id: ChainId) -> bool;
}

/// Pause flags of every configured chain
#[derive(Debug, Default, Clone)]
pub struct ScanControl {
    chains: BTreeMap<ChainId, Arc<ChainStatus>>,
}

impl ScanControl {
    pub fn new(statuses: impl IntoIterator<Item = Arc<ChainStatus>>) -> Self {
        Self {
            chains: statuses
                .into_iter()
                .map(|status| (status.chain_id(), status))
                .collect(),
        }
    }

    pub fn get(&self, chain_id: ChainId) -> Option<&Arc<ChainStatus>> {
        self.chains.get(&chain_id)
    }

    pub fn snapshots(&self) -> Vec<ChainStatusSnapshot> {
        self.chains.values().map(|status| status.snapshot()).collect()
    }
}

impl ScanController for ScanControl {
    fn pause(&self, chain_id: ChainId) -> bool {
        let Some(status) = self.chains.get(&chain_id) else {
            warn!(chain_id, "Pause requested for unknown chain");
            return false;
        };
        let changed = status.pause();
        if changed {
            warn!(chain_id, "Chain scanning paused");
        }
        changed
    }

    fn resume(&self, chain_id: ChainId) -> bool {
        let Some(status) = self.chains.get(&chain_id) else {
            warn!(chain_id, "Resume requested for unknown chain");
            return false;
        };
        let changed = status.resume();
        if changed {
            info!(chain_id, "Chain scanning resumed");
        }
        changed
    }

    fn is_paused(&self, chain_id: ChainId) -> bool {
        self.chains
            .get(&chain_id)
            .is_some_and(|status| status.is_paused())
    }
}
