//! Collaborator clients
//!
//! The scanning core only sees the traits below. The HTTP implementations
//! share one [`auth::AuthSession`] capability each instead of a common base.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::providers::ProviderEndpoint;
use crate::types::{ChainId, EventKind, ForwardReceipt, RawEvent, TransferEvent};

pub mod auth;
pub mod error;
pub mod rpc;
pub mod settlement;
pub mod store;

pub use auth::{AuthSession, Credentials};
pub use error::ClientError;
pub use rpc::HttpChainRpc;
pub use settlement::{NodeInfo, SettlementClient};
pub use store::{StoreClient, StoreNames};

/// Reads raw bridge events of a chain from one RPC endpoint
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn fetch_transactions(
        &self,
        chain_id: ChainId,
        endpoint: &ProviderEndpoint,
        after_nonce: Option<u64>,
    ) -> Result<Vec<RawEvent>, ClientError>;
}

/// Best-effort alert channel
#[async_trait]
pub trait ErrorNotifier: Send + Sync {
    async fn notify_error(&self, message: &str) -> Result<(), ClientError>;
}

/// Downstream destination for accepted events
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn forward(
        &self,
        chain_id: ChainId,
        event: &TransferEvent,
    ) -> Result<ForwardReceipt, ClientError>;
}

/// Writes accepted events to the log/document store, then reports them to
/// the settlement API
pub struct DownstreamForwarder {
    store: Arc<StoreClient>,
    settlement: Arc<SettlementClient>,
}

impl DownstreamForwarder {
    pub fn new(store: Arc<StoreClient>, settlement: Arc<SettlementClient>) -> Self {
        Self { store, settlement }
    }
}

#[async_trait]
impl EventSink for DownstreamForwarder {
    async fn forward(
        &self,
        chain_id: ChainId,
        event: &TransferEvent,
    ) -> Result<ForwardReceipt, ClientError> {
        let receipt = match &event.kind {
            EventKind::SignedSubmission { send_event } => {
                self.store
                    .add_signed_submission(&event.submission_id, &event.signature, send_event)
                    .await?
            }
            EventKind::ConfirmNewAssets {
                deploy_id,
                send_event,
            } => {
                self.store
                    .add_confirm_new_assets(deploy_id, &event.signature, send_event)
                    .await?
            }
        };

        if let Err(e) = self
            .settlement
            .submit_confirmation(chain_id, event, &receipt)
            .await
        {
            warn!(
                chain_id,
                submission_id = %event.submission_id,
                error = %e,
                log_hash = %receipt.log_hash,
                docs_hash = %receipt.docs_hash,
                "Stored event but failed to report confirmation to settlement API"
            );
            return Err(e);
        }

        Ok(receipt)
    }
}
