//! Scanning loop of a single chain
//!
//! Each cycle reads the events after the last accepted nonce from the first
//! selectable endpoint, classifies them in order, lets the recovery policy act
//! on anomalies and forwards accepted events downstream.

use eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::state::ChainScanState;
use crate::clients::{ChainRpc, EventSink};
use crate::metrics::Metrics;
use crate::nonce::{validate_nonce, NonceValidation};
use crate::providers::ChainProviders;
use crate::recovery::{ProcessResult, RecoveryPolicy};
use crate::types::{ChainId, TransferEvent};

/// What one scan cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Chain is paused, nothing was fetched
    Paused,
    /// No endpoint is both valid and active
    NoEndpoint,
    /// The endpoint could not be read
    TransportFailed,
    Processed {
        accepted: usize,
        redelivered: usize,
        /// First non-success verdict of the batch, if any
        first_anomaly: Option<NonceValidation>,
    },
}

pub struct ChainScanner {
    chain_id: ChainId,
    providers: Arc<ChainProviders>,
    rpc: Arc<dyn ChainRpc>,
    sink: Arc<dyn EventSink>,
    recovery: Arc<RecoveryPolicy>,
    metrics: Arc<Metrics>,
    state: ChainScanState,
    poll_interval: Duration,
}

impl ChainScanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: ChainScanState,
        providers: Arc<ChainProviders>,
        rpc: Arc<dyn ChainRpc>,
        sink: Arc<dyn EventSink>,
        recovery: Arc<RecoveryPolicy>,
        metrics: Arc<Metrics>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            chain_id: state.status().chain_id(),
            providers,
            rpc,
            sink,
            recovery,
            metrics,
            state,
            poll_interval,
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn last_nonce(&self) -> Option<u64> {
        self.state.last_nonce()
    }

    /// Run the scanning loop until the task is aborted
    pub async fn run(mut self) -> Result<()> {
        info!(
            chain_id = self.chain_id,
            name = self.state.status().name(),
            endpoints = self.providers.endpoints().len(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Starting chain scanner"
        );
        self.metrics
            .set_selectable_endpoints(self.chain_id, self.providers.selectable_count());

        loop {
            let outcome = self.scan_once().await;
            debug!(chain_id = self.chain_id, ?outcome, "Scan cycle finished");
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Run a single scan cycle
    pub async fn scan_once(&mut self) -> CycleOutcome {
        let chain_id = self.chain_id;

        if self.state.status().is_paused() {
            debug!(chain_id, "Chain paused, skipping scan cycle");
            return CycleOutcome::Paused;
        }

        let providers = self.providers.clone();
        let Some(endpoint) = providers.select_endpoint() else {
            warn!(
                chain_id,
                configured = providers.endpoints().len(),
                "No valid and active RPC endpoint left, re-validate one through the operator API"
            );
            self.metrics.record_endpoint_exhausted(chain_id);
            return CycleOutcome::NoEndpoint;
        };

        let raw_events = match self
            .rpc
            .fetch_transactions(chain_id, endpoint, self.state.last_nonce())
            .await
        {
            Ok(events) => events,
            Err(e) => {
                warn!(chain_id, url = endpoint.url(), error = %e, "Failed to fetch events");
                self.metrics.record_transport_failure(chain_id, e.kind());
                return CycleOutcome::TransportFailed;
            }
        };

        if !raw_events.is_empty() {
            debug!(
                chain_id,
                url = endpoint.url(),
                count = raw_events.len(),
                after_nonce = ?self.state.last_nonce(),
                "Fetched events"
            );
        }

        let mut accepted = 0;
        let mut redelivered = 0;
        let mut first_anomaly = None;

        for raw in raw_events {
            let event = TransferEvent::from(raw);

            if self.state.is_redelivery(event.nonce, &event.submission_id) {
                debug!(
                    chain_id,
                    nonce = event.nonce,
                    submission_id = %event.submission_id,
                    "Skipping already accepted event"
                );
                self.metrics.record_redelivery(chain_id);
                redelivered += 1;
                continue;
            }

            let duplicate_check = self.state.needs_duplicate_check(event.nonce);
            let status = validate_nonce(self.state.last_nonce(), event.nonce, duplicate_check);
            let result = ProcessResult::from_validation(status, &event.submission_id, event.nonce);
            self.recovery
                .handle(&result, chain_id, &providers, endpoint.url())
                .await;

            // A pause or quarantine applied here takes effect next cycle
            if !status.is_success() {
                first_anomaly.get_or_insert(status);
                continue;
            }

            self.accept(event).await;
            accepted += 1;
        }

        CycleOutcome::Processed {
            accepted,
            redelivered,
            first_anomaly,
        }
    }

    async fn accept(&mut self, event: TransferEvent) {
        let chain_id = self.chain_id;
        self.state.advance(event.nonce, &event.submission_id);
        self.metrics.record_accepted(chain_id, event.nonce);
        info!(
            chain_id,
            nonce = event.nonce,
            submission_id = %event.submission_id,
            kind = event.kind.as_str(),
            "Accepted bridge event"
        );

        match self.sink.forward(chain_id, &event).await {
            Ok(receipt) => debug!(
                chain_id,
                nonce = event.nonce,
                log_hash = %receipt.log_hash,
                docs_hash = %receipt.docs_hash,
                "Forwarded event downstream"
            ),
            Err(e) => {
                error!(
                    chain_id,
                    nonce = event.nonce,
                    submission_id = %event.submission_id,
                    error = %e,
                    "Failed to forward accepted event"
                );
                self.metrics.record_forward_failure(chain_id);
            }
        }
    }
}
