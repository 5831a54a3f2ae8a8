//! Node announcement
//!
//! The store opens its log and document databases asynchronously after it
//! starts. Until both identifiers are published the node has nothing to
//! report, so the task polls the store on a fixed interval and reports the
//! identifiers with the node version to the settlement API exactly once.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::clients::{ClientError, NodeInfo, SettlementClient, StoreClient, StoreNames};

/// Where the store database identifiers come from
#[async_trait]
pub trait StoreNamesSource: Send + Sync {
    async fn get_names(&self) -> Result<StoreNames, ClientError>;
}

/// Where the node announcement goes
#[async_trait]
pub trait NodeInfoSink: Send + Sync {
    async fn update_node_info(&self, node_info: &NodeInfo) -> Result<(), ClientError>;
}

#[async_trait]
impl StoreNamesSource for StoreClient {
    async fn get_names(&self) -> Result<StoreNames, ClientError> {
        StoreClient::get_names(self).await
    }
}

#[async_trait]
impl NodeInfoSink for SettlementClient {
    async fn update_node_info(&self, node_info: &NodeInfo) -> Result<(), ClientError> {
        SettlementClient::update_node_info(self, node_info).await
    }
}

/// How the announce task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceOutcome {
    Announced { attempts: u32 },
    GaveUp { attempts: u32 },
    Shutdown,
}

pub fn node_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Poll the store every `interval` and announce once both identifiers exist.
///
/// Stops after the first successful announcement, after `max_attempts` ticks
/// or on shutdown, whichever comes first.
pub async fn run_announce_task(
    names: Arc<dyn StoreNamesSource>,
    sink: Arc<dyn NodeInfoSink>,
    interval: Duration,
    max_attempts: u32,
    mut shutdown: mpsc::Receiver<()>,
) -> AnnounceOutcome {
    info!(
        interval_ms = interval.as_millis() as u64,
        max_attempts, "Node announcement starting"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut attempts = 0;

    loop {
        if attempts >= max_attempts {
            warn!(attempts, "Giving up on node announcement");
            return AnnounceOutcome::GaveUp { attempts };
        }

        tokio::select! {
            _ = shutdown.recv() => {
                info!("Node announcement shutdown");
                return AnnounceOutcome::Shutdown;
            }
            _ = ticker.tick() => {
                attempts += 1;
                if announce_once(names.as_ref(), sink.as_ref()).await {
                    return AnnounceOutcome::Announced { attempts };
                }
            }
        }
    }
}

/// One attempt. Returns true once the node info was accepted.
async fn announce_once(names: &dyn StoreNamesSource, sink: &dyn NodeInfoSink) -> bool {
    let store_names = match names.get_names().await {
        Ok(store_names) => store_names,
        Err(e) => {
            warn!(error = %e, "Failed to read store names");
            return false;
        }
    };

    let Some((docs, logs)) = store_names.complete() else {
        debug!(?store_names, "Store databases not ready yet");
        return false;
    };

    let node_info = NodeInfo {
        orbit_docs_db: docs.to_string(),
        orbit_logs_db: logs.to_string(),
        node_version: node_version(),
    };

    match sink.update_node_info(&node_info).await {
        Ok(()) => {
            info!(
                orbit_docs_db = %node_info.orbit_docs_db,
                orbit_logs_db = %node_info.orbit_logs_db,
                node_version = %node_info.node_version,
                "Node announced to settlement API"
            );
            true
        }
        Err(e) => {
            warn!(error = %e, "Failed to announce node");
            false
        }
    }
}
