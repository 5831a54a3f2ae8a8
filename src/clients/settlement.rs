//! Settlement API client
//!
//! Receives alerts, confirmation reports for accepted events, and the one-time
//! node announcement.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use super::auth::AuthSession;
use super::error::ClientError;
use super::ErrorNotifier;
use crate::types::{ChainId, EventKind, ForwardReceipt, TransferEvent};

const LOGIN_PATH: &str = "/Account/authenticate";
const NOTIFY_ERROR_PATH: &str = "/Node/error";
const CONFIRM_SUBMISSION_PATH: &str = "/SubmissionConfirmations/confirm";
const CONFIRM_NEW_ASSETS_PATH: &str = "/ConfirmNewAssets/confirm";
const UPDATE_NODE_INFO_PATH: &str = "/Node/updateOrbitDb";

/// Store identifiers and node version reported once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub orbit_docs_db: String,
    pub orbit_logs_db: String,
    pub node_version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmationRequest<'a> {
    chain_id: ChainId,
    submission_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    deploy_id: Option<&'a str>,
    nonce: u64,
    signature: &'a str,
    log_hash: &'a str,
    docs_hash: &'a str,
}

pub struct SettlementClient {
    session: AuthSession,
}

impl SettlementClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        credentials: super::auth::Credentials,
    ) -> Self {
        Self {
            session: AuthSession::new(http, base_url, LOGIN_PATH, credentials),
        }
    }

    pub async fn notify_error(&self, message: &str) -> Result<(), ClientError> {
        debug!(message, "Sending error notification");
        self.session
            .post(NOTIFY_ERROR_PATH, &json!({ "message": message }))
            .await?;
        Ok(())
    }

    /// Report an accepted event together with the store hashes it was written under
    pub async fn submit_confirmation(
        &self,
        chain_id: ChainId,
        event: &TransferEvent,
        receipt: &ForwardReceipt,
    ) -> Result<(), ClientError> {
        let (path, deploy_id) = match &event.kind {
            EventKind::SignedSubmission { .. } => (CONFIRM_SUBMISSION_PATH, None),
            EventKind::ConfirmNewAssets { deploy_id, .. } => {
                (CONFIRM_NEW_ASSETS_PATH, Some(deploy_id.as_str()))
            }
        };
        let request = ConfirmationRequest {
            chain_id,
            submission_id: &event.submission_id,
            deploy_id,
            nonce: event.nonce,
            signature: &event.signature,
            log_hash: &receipt.log_hash,
            docs_hash: &receipt.docs_hash,
        };
        self.session.post(path, &request).await?;
        Ok(())
    }

    pub async fn update_node_info(&self, node_info: &NodeInfo) -> Result<(), ClientError> {
        self.session.post(UPDATE_NODE_INFO_PATH, node_info).await?;
        info!(
            orbit_docs_db = %node_info.orbit_docs_db,
            orbit_logs_db = %node_info.orbit_logs_db,
            node_version = %node_info.node_version,
            "Node info reported"
        );
        Ok(())
    }
}

#[async_trait]
impl ErrorNotifier for SettlementClient {
    async fn notify_error(&self, message: &str) -> Result<(), ClientError> {
        SettlementClient::notify_error(self, message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_info_serializes_camel_case() {
        let info = NodeInfo {
            orbit_docs_db: "/orbitdb/docs".to_string(),
            orbit_logs_db: "/orbitdb/logs".to_string(),
            node_version: "0.1.0".to_string(),
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(
            value,
            json!({
                "orbitDocsDb": "/orbitdb/docs",
                "orbitLogsDb": "/orbitdb/logs",
                "nodeVersion": "0.1.0"
            })
        );
    }

    #[test]
    fn test_confirmation_request_omits_missing_deploy_id() {
        let request = ConfirmationRequest {
            chain_id: 97,
            submission_id: "0xsub",
            deploy_id: None,
            nonce: 3,
            signature: "0xsig",
            log_hash: "log",
            docs_hash: "docs",
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("deployId").is_none());
        assert_eq!(value["submissionId"], "0xsub");
        assert_eq!(value["chainId"], 97);
    }
}
