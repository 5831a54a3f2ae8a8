//! Distributed log/document store client
//!
//! Every accepted event is written twice: once to the append-only log and once
//! to the document store. Both writes run concurrently and each returns its
//! own hash.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::auth::{AuthSession, Credentials};
use super::error::ClientError;
use crate::types::ForwardReceipt;

const LOGIN_PATH: &str = "/login";
const NAMES_PATH: &str = "/names";
const ADD_LOG_SIGNED_SUBMISSION_PATH: &str = "/addLogSignedSubmission";
const ADD_DOCS_SIGNED_SUBMISSION_PATH: &str = "/addDocsSignedSubmission";
const ADD_LOG_CONFIRM_NEW_ASSETS_PATH: &str = "/addLogConfirmNewAssets";
const ADD_DOCS_CONFIRM_NEW_ASSETS_PATH: &str = "/addDocsConfirmNewAssets";

/// Identifiers of the store's databases, once it has opened them
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreNames {
    #[serde(default)]
    pub orbit_docs_db: Option<String>,
    #[serde(default)]
    pub orbit_logs_db: Option<String>,
}

impl StoreNames {
    /// Both identifiers, when the store has published them
    pub fn complete(&self) -> Option<(&str, &str)> {
        match (self.orbit_docs_db.as_deref(), self.orbit_logs_db.as_deref()) {
            (Some(docs), Some(logs)) if !docs.is_empty() && !logs.is_empty() => Some((docs, logs)),
            _ => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedSubmissionRecord<'a> {
    submission_id: &'a str,
    signature: &'a str,
    send_event: &'a serde_json::Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmNewAssetsRecord<'a> {
    deploy_id: &'a str,
    signature: &'a str,
    send_event: &'a serde_json::Value,
}

pub struct StoreClient {
    session: AuthSession,
}

impl StoreClient {
    pub fn new(http: reqwest::Client, base_url: &str, credentials: Credentials) -> Self {
        Self {
            session: AuthSession::new(http, base_url, LOGIN_PATH, credentials),
        }
    }

    pub async fn get_names(&self) -> Result<StoreNames, ClientError> {
        self.session
            .post_json(NAMES_PATH, &serde_json::json!({}))
            .await
    }

    pub async fn add_signed_submission(
        &self,
        submission_id: &str,
        signature: &str,
        send_event: &serde_json::Value,
    ) -> Result<ForwardReceipt, ClientError> {
        info!(submission_id, signature, "Adding signed submission");
        let record = SignedSubmissionRecord {
            submission_id,
            signature,
            send_event,
        };
        let (log_hash, docs_hash) = tokio::try_join!(
            self.session
                .post_for_hash(ADD_LOG_SIGNED_SUBMISSION_PATH, &record),
            self.session
                .post_for_hash(ADD_DOCS_SIGNED_SUBMISSION_PATH, &record),
        )?;
        debug!(submission_id, %log_hash, %docs_hash, "Signed submission stored");
        Ok(ForwardReceipt {
            log_hash,
            docs_hash,
        })
    }

    pub async fn add_confirm_new_assets(
        &self,
        deploy_id: &str,
        signature: &str,
        send_event: &serde_json::Value,
    ) -> Result<ForwardReceipt, ClientError> {
        info!(deploy_id, signature, "Adding confirm new assets");
        let record = ConfirmNewAssetsRecord {
            deploy_id,
            signature,
            send_event,
        };
        let (log_hash, docs_hash) = tokio::try_join!(
            self.session
                .post_for_hash(ADD_LOG_CONFIRM_NEW_ASSETS_PATH, &record),
            self.session
                .post_for_hash(ADD_DOCS_CONFIRM_NEW_ASSETS_PATH, &record),
        )?;
        debug!(deploy_id, %log_hash, %docs_hash, "Confirm new assets stored");
        Ok(ForwardReceipt {
            log_hash,
            docs_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_names_complete() {
        let names = StoreNames {
            orbit_docs_db: Some("docs".to_string()),
            orbit_logs_db: Some("logs".to_string()),
        };
        assert_eq!(names.complete(), Some(("docs", "logs")));
    }

    #[test]
    fn test_store_names_incomplete() {
        let names: StoreNames = serde_json::from_str(r#"{"orbitDocsDb":"docs"}"#).unwrap();
        assert_eq!(names.complete(), None);

        let names: StoreNames =
            serde_json::from_str(r#"{"orbitDocsDb":"","orbitLogsDb":"logs"}"#).unwrap();
        assert_eq!(names.complete(), None);

        assert_eq!(StoreNames::default().complete(), None);
    }
}
