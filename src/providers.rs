//! RPC endpoint registry for a single chain
//!
//! Endpoints keep their configured order. The scanner always reads from the
//! first endpoint that is both valid (healthy) and active (operator-enabled).
//! Quarantined endpoints stay in the list so they can be re-validated later.

use eyre::{eyre, Result};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::types::ChainId;

/// Parse a comma-separated RPC URL string into individual trimmed URLs.
pub fn parse_rpc_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Validates that a URL uses http/https and has a host component.
pub fn validate_rpc_url(url_str: &str, name: &str) -> Result<()> {
    let parsed =
        url::Url::parse(url_str).map_err(|e| eyre!("{} must be a valid URL: {}", name, e))?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(eyre!(
            "{} must use http:// or https:// scheme, got {}",
            name,
            scheme
        ));
    }

    if parsed.host_str().is_none() {
        return Err(eyre!("{} must have a host component", name));
    }

    if scheme == "http" {
        warn!("{} uses unencrypted http://, prefer https:// in production", name);
    }

    Ok(())
}

/// How requests to an RPC endpoint are authenticated
#[derive(Clone, PartialEq, Eq)]
pub enum AuthType {
    None,
    Basic { username: String, password: String },
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::None => "none",
            AuthType::Basic { .. } => "basic",
        }
    }
}

/// Custom Debug that redacts the password to prevent accidental log leakage.
impl fmt::Debug for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthType::None => f.write_str("None"),
            AuthType::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// One RPC source for a chain
#[derive(Debug)]
pub struct ProviderEndpoint {
    url: String,
    auth: AuthType,
    /// Health flag, cleared when the endpoint serves a nonce gap
    is_valid: AtomicBool,
    /// Operator-controlled eligibility
    is_active: AtomicBool,
}

impl ProviderEndpoint {
    pub fn new(url: impl Into<String>, auth: AuthType) -> Self {
        Self {
            url: url.into(),
            auth,
            is_valid: AtomicBool::new(true),
            is_active: AtomicBool::new(true),
        }
    }

    /// Builder-style override of the operator eligibility flag
    pub fn with_active(self, active: bool) -> Self {
        self.is_active.store(active, Ordering::SeqCst);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn auth(&self) -> &AuthType {
        &self.auth
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::SeqCst)
    }

    pub fn is_selectable(&self) -> bool {
        self.is_valid() && self.is_active()
    }
}

/// Serializable view of an endpoint for the operator API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSnapshot {
    pub url: String,
    pub auth_type: &'static str,
    pub is_valid: bool,
    pub is_active: bool,
}

/// Ordered RPC endpoints of one chain with their health flags
#[derive(Debug)]
pub struct ChainProviders {
    chain_id: ChainId,
    endpoints: Vec<ProviderEndpoint>,
}

impl ChainProviders {
    pub fn new(chain_id: ChainId, endpoints: Vec<ProviderEndpoint>) -> Self {
        Self {
            chain_id,
            endpoints,
        }
    }

    /// Unauthenticated endpoints, all valid and active
    pub fn from_urls(chain_id: ChainId, urls: &[String]) -> Self {
        let endpoints = urls
            .iter()
            .map(|url| ProviderEndpoint::new(url.clone(), AuthType::None))
            .collect();
        Self::new(chain_id, endpoints)
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn endpoints(&self) -> &[ProviderEndpoint] {
        &self.endpoints
    }

    /// First endpoint in configured order that is valid and active.
    ///
    /// `None` means the chain has no usable endpoint left.
    pub fn select_endpoint(&self) -> Option<&ProviderEndpoint> {
        self.endpoints.iter().find(|e| e.is_selectable())
    }

    /// Mark the endpoint serving `url` as invalid. Idempotent.
    ///
    /// Returns true when the flag actually changed.
    pub fn quarantine(&self, url: &str) -> bool {
        self.set_provider_status(url, false)
    }

    /// Set the health flag of the endpoint serving `url`.
    ///
    /// Returns true when the flag actually changed.
    pub fn set_provider_status(&self, url: &str, is_valid: bool) -> bool {
        let Some(endpoint) = self.endpoints.iter().find(|e| e.url == url) else {
            warn!(chain_id = self.chain_id, url, "Unknown provider endpoint");
            return false;
        };

        let previous = endpoint.is_valid.swap(is_valid, Ordering::SeqCst);
        if previous == is_valid {
            return false;
        }

        if is_valid {
            info!(chain_id = self.chain_id, url, "Provider endpoint re-validated");
        } else {
            warn!(
                chain_id = self.chain_id,
                url,
                remaining = self.selectable_count(),
                "Provider endpoint quarantined"
            );
        }
        true
    }

    pub fn selectable_count(&self) -> usize {
        self.endpoints.iter().filter(|e| e.is_selectable()).count()
    }

    pub fn snapshot(&self) -> Vec<EndpointSnapshot> {
        self.endpoints
            .iter()
            .map(|e| EndpointSnapshot {
                url: e.url.clone(),
                auth_type: e.auth.as_str(),
                is_valid: e.is_valid(),
                is_active: e.is_active(),
            })
            .collect()
    }
}
