//! Common types for bridge event ingestion
//!
//! Raw records as returned by a chain RPC endpoint, the tagged event form the
//! scanner works with, and the per-chain scan state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Native chain identifier (e.g. 97 for BSC testnet)
pub type ChainId = u64;

/// Run state of a chain's scanning loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanState {
    Active,
    Paused,
}

impl ScanState {
    /// Get the state as a lowercase string
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanState::Active => "active",
            ScanState::Paused => "paused",
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Event record as delivered by the chain RPC collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub submission_id: String,
    pub nonce: u64,
    /// Present only for "confirm new assets" events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy_id: Option<String>,
    pub signature: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// What a bridge event asks the node to confirm
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// A cross-chain transfer submission signed by this node
    SignedSubmission { send_event: serde_json::Value },
    /// Confirmation of a newly deployed asset
    ConfirmNewAssets {
        deploy_id: String,
        send_event: serde_json::Value,
    },
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SignedSubmission { .. } => "signed_submission",
            EventKind::ConfirmNewAssets { .. } => "confirm_new_assets",
        }
    }
}

/// A bridge event picked up during one scan cycle. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferEvent {
    pub submission_id: String,
    pub nonce: u64,
    pub signature: String,
    pub kind: EventKind,
}

impl From<RawEvent> for TransferEvent {
    fn from(raw: RawEvent) -> Self {
        let kind = match raw.deploy_id {
            Some(deploy_id) => EventKind::ConfirmNewAssets {
                deploy_id,
                send_event: raw.payload,
            },
            None => EventKind::SignedSubmission {
                send_event: raw.payload,
            },
        };
        Self {
            submission_id: raw.submission_id,
            nonce: raw.nonce,
            signature: raw.signature,
            kind,
        }
    }
}

/// Hashes returned by the downstream destinations for one forwarded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardReceipt {
    pub log_hash: String,
    pub docs_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scan_state_as_str() {
        assert_eq!(ScanState::Active.as_str(), "active");
        assert_eq!(ScanState::Paused.as_str(), "paused");
        assert_eq!(format!("{}", ScanState::Paused), "paused");
    }

    #[test]
    fn test_raw_event_without_deploy_id_is_signed_submission() {
        let raw: RawEvent = serde_json::from_value(json!({
            "submissionId": "0xabc",
            "nonce": 4,
            "signature": "0xsig",
            "payload": {"amount": "100"}
        }))
        .unwrap();

        let event = TransferEvent::from(raw);
        assert_eq!(event.submission_id, "0xabc");
        assert_eq!(event.nonce, 4);
        assert_eq!(
            event.kind,
            EventKind::SignedSubmission {
                send_event: json!({"amount": "100"})
            }
        );
        assert_eq!(event.kind.as_str(), "signed_submission");
    }

    #[test]
    fn test_raw_event_with_deploy_id_is_confirm_new_assets() {
        let raw: RawEvent = serde_json::from_value(json!({
            "submissionId": "0xdef",
            "nonce": 0,
            "deployId": "0xdeploy",
            "signature": "0xsig"
        }))
        .unwrap();

        match TransferEvent::from(raw).kind {
            EventKind::ConfirmNewAssets {
                deploy_id,
                send_event,
            } => {
                assert_eq!(deploy_id, "0xdeploy");
                assert!(send_event.is_null());
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }
}
