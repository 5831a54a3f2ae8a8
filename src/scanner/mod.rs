use eyre::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::clients::{ChainRpc, ErrorNotifier, EventSink};
use crate::config::{ChainConfig, ScanConfig};
use crate::metrics::Metrics;
use crate::providers::ChainProviders;
use crate::recovery::RecoveryPolicy;
use crate::types::ChainId;

pub mod chain;
pub mod control;
pub mod state;

pub use chain::{ChainScanner, CycleOutcome};
pub use control::{ScanControl, ScanController};
pub use state::{ChainScanState, ChainStatus, ChainStatusSnapshot};

/// Endpoint registries of all scanned chains, shared with the operator API
pub type ProviderRegistry = BTreeMap<ChainId, Arc<ChainProviders>>;

/// Collaborators shared by every chain scanner
#[derive(Clone)]
pub struct ScanDeps {
    pub rpc: Arc<dyn ChainRpc>,
    pub notifier: Arc<dyn ErrorNotifier>,
    pub sink: Arc<dyn EventSink>,
    pub metrics: Arc<Metrics>,
}

/// Runs one scanner per enabled chain
pub struct ScanManager {
    scanners: Vec<ChainScanner>,
    control: Arc<ScanControl>,
    providers: ProviderRegistry,
}

impl ScanManager {
    pub fn new<'a>(
        chains: impl IntoIterator<Item = &'a ChainConfig>,
        settings: &ScanConfig,
        deps: ScanDeps,
    ) -> Self {
        let mut statuses = Vec::new();
        let mut providers = ProviderRegistry::new();
        let mut pending = Vec::new();

        for chain in chains {
            let status = Arc::new(ChainStatus::new(chain.chain_id, chain.name.clone()));
            let chain_providers = Arc::new(chain.build_providers());
            statuses.push(status.clone());
            providers.insert(chain.chain_id, chain_providers.clone());
            pending.push((status, chain_providers));
        }

        let control = Arc::new(ScanControl::new(statuses));
        let recovery = Arc::new(RecoveryPolicy::new(
            deps.notifier.clone(),
            control.clone(),
            deps.metrics.clone(),
        ));

        let scanners: Vec<ChainScanner> = pending
            .into_iter()
            .map(|(status, chain_providers)| {
                ChainScanner::new(
                    ChainScanState::new(status, settings.accepted_nonce_cache_size),
                    chain_providers,
                    deps.rpc.clone(),
                    deps.sink.clone(),
                    recovery.clone(),
                    deps.metrics.clone(),
                    settings.poll_interval(),
                )
            })
            .collect();

        info!(
            chains = scanners.len(),
            chain_ids = ?providers.keys().collect::<Vec<_>>(),
            "Scan manager created"
        );

        Self {
            scanners,
            control,
            providers,
        }
    }

    pub fn control(&self) -> Arc<ScanControl> {
        self.control.clone()
    }

    pub fn providers(&self) -> ProviderRegistry {
        self.providers.clone()
    }

    /// Run all scanners concurrently
    /// Returns when any scanner fails or shutdown signal received
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        let mut join_set = tokio::task::JoinSet::new();

        for scanner in self.scanners {
            join_set.spawn(async move { scanner.run().await });
        }

        tokio::select! {
            _ = shutdown.recv() => {
                info!("Shutdown signal received, stopping chain scanners");
                join_set.abort_all();
                Ok(())
            }
            maybe_done = join_set.join_next() => {
                match maybe_done {
                    Some(Ok(Ok(()))) => {
                        error!("A chain scanner exited unexpectedly without error");
                        Err(eyre::eyre!("chain scanner exited unexpectedly"))
                    }
                    Some(Ok(Err(e))) => {
                        error!("A chain scanner stopped with error: {:?}", e);
                        Err(e)
                    }
                    Some(Err(e)) => {
                        error!("A chain scanner task panicked: {:?}", e);
                        Err(eyre::eyre!("chain scanner task panicked: {}", e))
                    }
                    None => {
                        error!("All chain scanner tasks exited unexpectedly");
                        Err(eyre::eyre!("all chain scanner tasks exited unexpectedly"))
                    }
                }
            }
        }
    }
}
