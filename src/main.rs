use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use relay_ingest::announce::{self, AnnounceOutcome};
use relay_ingest::api::{self, AppState};
use relay_ingest::clients::{DownstreamForwarder, HttpChainRpc, SettlementClient, StoreClient};
use relay_ingest::config::Config;
use relay_ingest::metrics::Metrics;
use relay_ingest::scanner::{ScanDeps, ScanManager};

fn main() -> eyre::Result<()> {
    // Install color-eyre for better error reporting
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting relay ingest node");

    let config = Config::load()?;
    info!(
        chains = config.chains.len(),
        chain_ids = ?config.enabled_chains().map(|c| c.chain_id).collect::<Vec<_>>(),
        settlement_url = %config.settlement.url,
        store_url = %config.store.url,
        "Configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(config.http.timeout())
        .build()?;

    let settlement = Arc::new(SettlementClient::new(
        http.clone(),
        &config.settlement.url,
        config.settlement.credentials(),
    ));
    let store = Arc::new(StoreClient::new(
        http.clone(),
        &config.store.url,
        config.store.credentials(),
    ));
    let metrics = Arc::new(Metrics::new());

    let manager = ScanManager::new(
        config.enabled_chains(),
        &config.scan,
        ScanDeps {
            rpc: Arc::new(HttpChainRpc::new(http)),
            notifier: settlement.clone(),
            sink: Arc::new(DownstreamForwarder::new(store.clone(), settlement.clone())),
            metrics: metrics.clone(),
        },
    );

    // Create shutdown channels
    let (scan_tx, scan_rx) = mpsc::channel::<()>(1);
    let (announce_tx, announce_rx) = mpsc::channel::<()>(1);
    let (api_tx, api_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = scan_tx.send(()).await;
        let _ = announce_tx.send(()).await;
        let _ = api_tx.send(()).await;
    });

    let state = AppState {
        control: manager.control(),
        providers: Arc::new(manager.providers()),
        metrics,
        started_at: chrono::Utc::now(),
    };
    let api_addr = config.api.socket_addr()?;
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::start_server(api_addr, state, api_rx).await {
            error!(error = %e, "Operator API error");
        }
    });

    let announce_interval = config.announce.interval();
    let announce_max_attempts = config.announce.max_attempts;
    tokio::spawn(async move {
        match announce::run_announce_task(
            store,
            settlement,
            announce_interval,
            announce_max_attempts,
            announce_rx,
        )
        .await
        {
            AnnounceOutcome::GaveUp { attempts } => {
                error!(attempts, "Node was never announced to the settlement API")
            }
            outcome => info!(?outcome, "Node announcement finished"),
        }
    });

    let result = manager.run(scan_rx).await;
    if let Err(e) = &result {
        error!(error = %e, "Scan manager error");
    }

    api_handle.abort();
    info!("Relay ingest node stopped");
    result
}

/// Initialize tracing/logging with structured output
///
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,relay_ingest=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .init();
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown");
        }
    }
}
