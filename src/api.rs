//! Operator API
//!
//! - GET /health - Per-chain summary (JSON)
//! - GET /healthz - Liveness probe
//! - GET /readyz - Readiness probe
//! - GET /metrics - Prometheus metrics
//! - GET /chains - Scan state, last nonce and endpoints of every chain
//! - POST /chains/{id}/pause, POST /chains/{id}/resume
//! - POST /chains/{id}/providers - Re-validate or invalidate one endpoint

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::metrics::Metrics;
use crate::providers::EndpointSnapshot;
use crate::scanner::{ProviderRegistry, ScanControl, ScanController};
use crate::types::{ChainId, ScanState};

/// Shared state for the HTTP server
#[derive(Clone)]
pub struct AppState {
    pub control: Arc<ScanControl>,
    pub providers: Arc<ProviderRegistry>,
    pub metrics: Arc<Metrics>,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_version: String,
    pub uptime_seconds: i64,
    pub chains: usize,
    pub paused_chains: Vec<ChainId>,
    pub chains_without_endpoint: Vec<ChainId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainView {
    pub chain_id: ChainId,
    pub name: String,
    pub state: ScanState,
    pub last_nonce: Option<u64>,
    pub last_accepted_at: Option<DateTime<Utc>>,
    pub providers: Vec<EndpointSnapshot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatusRequest {
    pub url: String,
    pub is_valid: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatusResponse {
    pub chain_id: ChainId,
    pub url: String,
    pub is_valid: bool,
    pub changed: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn not_found(message: String) -> ApiError {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: message }))
}

impl AppState {
    fn chain_view(&self, chain_id: ChainId) -> Option<ChainView> {
        let status = self.control.get(chain_id)?;
        let snapshot = status.snapshot();
        Some(ChainView {
            chain_id,
            name: snapshot.name,
            state: snapshot.state,
            last_nonce: snapshot.last_nonce,
            last_accepted_at: snapshot.last_accepted_at,
            providers: self
                .providers
                .get(&chain_id)
                .map(|p| p.snapshot())
                .unwrap_or_default(),
        })
    }

    fn known_chain(&self, chain_id: ChainId) -> Result<(), ApiError> {
        match self.control.get(chain_id) {
            Some(_) => Ok(()),
            None => Err(not_found(format!("unknown chain {}", chain_id))),
        }
    }
}

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshots = state.control.snapshots();
    let paused_chains = snapshots
        .iter()
        .filter(|s| s.state == ScanState::Paused)
        .map(|s| s.chain_id)
        .collect();
    let chains_without_endpoint = state
        .providers
        .iter()
        .filter(|(_, p)| p.select_endpoint().is_none())
        .map(|(chain_id, _)| *chain_id)
        .collect();

    Json(HealthResponse {
        status: "healthy".to_string(),
        node_version: crate::announce::node_version(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        chains: snapshots.len(),
        paused_chains,
        chains_without_endpoint,
    })
}

/// Liveness probe (always returns OK if server is running)
pub async fn liveness() -> &'static str {
    "OK"
}

/// Ready while at least one chain is active and has a selectable endpoint
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, &'static str) {
    let any_scanning = state.control.snapshots().iter().any(|s| {
        s.state == ScanState::Active
            && state
                .providers
                .get(&s.chain_id)
                .is_some_and(|p| p.select_endpoint().is_some())
    });

    if any_scanning {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY")
    }
}

/// Prometheus metrics endpoint
pub async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    for (chain_id, providers) in state.providers.iter() {
        state
            .metrics
            .set_selectable_endpoints(*chain_id, providers.selectable_count());
    }

    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

pub async fn list_chains(State(state): State<AppState>) -> Json<Vec<ChainView>> {
    let views = state
        .control
        .snapshots()
        .iter()
        .filter_map(|s| state.chain_view(s.chain_id))
        .collect();
    Json(views)
}

pub async fn pause_chain(
    State(state): State<AppState>,
    Path(chain_id): Path<ChainId>,
) -> Result<Json<ChainView>, ApiError> {
    state.known_chain(chain_id)?;
    info!(chain_id, "Pause requested through operator API");
    state.control.pause(chain_id);
    state
        .chain_view(chain_id)
        .map(Json)
        .ok_or_else(|| not_found(format!("unknown chain {}", chain_id)))
}

pub async fn resume_chain(
    State(state): State<AppState>,
    Path(chain_id): Path<ChainId>,
) -> Result<Json<ChainView>, ApiError> {
    state.known_chain(chain_id)?;
    info!(chain_id, "Resume requested through operator API");
    state.control.resume(chain_id);
    state
        .chain_view(chain_id)
        .map(Json)
        .ok_or_else(|| not_found(format!("unknown chain {}", chain_id)))
}

pub async fn set_provider_status(
    State(state): State<AppState>,
    Path(chain_id): Path<ChainId>,
    Json(request): Json<ProviderStatusRequest>,
) -> Result<Json<ProviderStatusResponse>, ApiError> {
    let providers = state
        .providers
        .get(&chain_id)
        .ok_or_else(|| not_found(format!("unknown chain {}", chain_id)))?;

    if !providers.endpoints().iter().any(|e| e.url() == request.url) {
        return Err(not_found(format!(
            "chain {} has no endpoint {}",
            chain_id, request.url
        )));
    }

    let changed = providers.set_provider_status(&request.url, request.is_valid);
    state
        .metrics
        .set_selectable_endpoints(chain_id, providers.selectable_count());

    Ok(Json(ProviderStatusResponse {
        chain_id,
        url: request.url,
        is_valid: request.is_valid,
        changed,
    }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .route("/chains", get(list_chains))
        .route("/chains/{id}/pause", post(pause_chain))
        .route("/chains/{id}/resume", post(resume_chain))
        .route("/chains/{id}/providers", post(set_provider_status))
        .with_state(state)
}

/// Serve the operator API until shutdown
pub async fn start_server(
    addr: SocketAddr,
    state: AppState,
    mut shutdown: mpsc::Receiver<()>,
) -> eyre::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Operator API listening on {}", addr);
    info!("  /health  - Full health status (JSON)");
    info!("  /chains  - Chain scan state and endpoints");
    info!("  /metrics - Prometheus metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.recv().await;
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ChainProviders;
    use crate::scanner::ChainStatus;

    fn state() -> AppState {
        let control = Arc::new(ScanControl::new([
            Arc::new(ChainStatus::new(1, "eth")),
            Arc::new(ChainStatus::new(97, "bsc-testnet")),
        ]));
        let mut providers = ProviderRegistry::new();
        providers.insert(
            1,
            Arc::new(ChainProviders::from_urls(1, &["https://eth.example.com".to_string()])),
        );
        providers.insert(
            97,
            Arc::new(ChainProviders::from_urls(97, &["debridge.io".to_string()])),
        );
        AppState {
            control,
            providers: Arc::new(providers),
            metrics: Arc::new(Metrics::new()),
            started_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_liveness() {
        assert_eq!(liveness().await, "OK");
    }

    #[tokio::test]
    async fn test_list_chains() {
        let Json(chains) = list_chains(State(state())).await;
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[1].chain_id, 97);
        assert_eq!(chains[1].state, ScanState::Active);
        assert_eq!(chains[1].providers[0].url, "debridge.io");
        assert!(chains[1].providers[0].is_valid);
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let state = state();

        let Json(view) = pause_chain(State(state.clone()), Path(97)).await.unwrap();
        assert_eq!(view.state, ScanState::Paused);
        assert!(state.control.is_paused(97));
        assert!(!state.control.is_paused(1));

        let Json(view) = resume_chain(State(state.clone()), Path(97)).await.unwrap();
        assert_eq!(view.state, ScanState::Active);
    }

    #[tokio::test]
    async fn test_unknown_chain_is_404() {
        let (status, _) = pause_chain(State(state()), Path(42)).await.unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_provider_revalidation() {
        let state = state();
        state.providers[&97].quarantine("debridge.io");

        let Json(response) = set_provider_status(
            State(state.clone()),
            Path(97),
            Json(ProviderStatusRequest {
                url: "debridge.io".to_string(),
                is_valid: true,
            }),
        )
        .await
        .unwrap();

        assert!(response.changed);
        assert!(state.providers[&97].select_endpoint().is_some());
    }

    #[tokio::test]
    async fn test_provider_unknown_url_is_404() {
        let (status, _) = set_provider_status(
            State(state()),
            Path(97),
            Json(ProviderStatusRequest {
                url: "https://unknown.example.com".to_string(),
                is_valid: true,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_readiness_tracks_active_chains() {
        let state = state();
        let (status, _) = readiness(State(state.clone())).await;
        assert_eq!(status, StatusCode::OK);

        state.control.pause(1);
        state.providers[&97].quarantine("debridge.io");
        let (status, body) = readiness(State(state.clone())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "NOT_READY");
    }

    #[tokio::test]
    async fn test_health_lists_paused_and_exhausted_chains() {
        let state = state();
        state.control.pause(1);
        state.providers[&97].quarantine("debridge.io");

        let Json(health) = health_check(State(state)).await;
        assert_eq!(health.chains, 2);
        assert!(health.uptime_seconds >= 0);
        assert_eq!(health.paused_chains, vec![1]);
        assert_eq!(health.chains_without_endpoint, vec![97]);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_renders_text() {
        let state = state();
        state.metrics.record_pause(97);
        let response = prometheus_metrics(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }
}
