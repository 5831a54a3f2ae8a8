//! JSON-RPC chain client
//!
//! Asks an endpoint for the bridge events of a chain that come after the last
//! accepted nonce.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::error::ClientError;
use super::ChainRpc;
use crate::providers::{AuthType, ProviderEndpoint};
use crate::types::{ChainId, RawEvent};

const GET_SUBMISSIONS_METHOD: &str = "bridge_getSubmissions";

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Vec<RawEvent>>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

/// [`ChainRpc`] over plain HTTP JSON-RPC
#[derive(Clone)]
pub struct HttpChainRpc {
    http: reqwest::Client,
}

impl HttpChainRpc {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ChainRpc for HttpChainRpc {
    async fn fetch_transactions(
        &self,
        chain_id: ChainId,
        endpoint: &ProviderEndpoint,
        after_nonce: Option<u64>,
    ) -> Result<Vec<RawEvent>, ClientError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": GET_SUBMISSIONS_METHOD,
            "params": [{ "chainId": chain_id, "afterNonce": after_nonce }],
        });

        let mut builder = self.http.post(endpoint.url()).json(&request);
        if let AuthType::Basic { username, password } = endpoint.auth() {
            builder = builder.basic_auth(username, Some(password));
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                url: endpoint.url().to_string(),
                status,
                body,
            });
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| ClientError::decode(endpoint.url(), e))?;

        if let Some(error) = body.error {
            return Err(ClientError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        let events = body.result.unwrap_or_default();
        debug!(
            chain_id,
            url = endpoint.url(),
            count = events.len(),
            "Fetched bridge events"
        );
        Ok(events)
    }
}
