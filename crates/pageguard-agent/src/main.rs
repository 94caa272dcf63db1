//! PageGuard agent binary
//!
//! `scan` runs a full page visit against a recorded snapshot, `serve` runs
//! the cross-origin fetch broker, `cleanup` prunes social and search
//! entries from the block list.

use anyhow::Result;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use pageguard_agent::{
    create_router, AgentConfig, AgentContext, BrokerState, ClassifierSource, ConfigOverrides, HttpFetchProxy,
    HttpResourceFetcher, ImageLoader, PageAgent, PageSnapshot, Progress, SessionState, SnapshotDocument,
    StaticResources,
};
use pageguard_classifiers::{CandidateFilter, HttpLanguageModel, ResultCache};
use pageguard_core::NodeId;
use pageguard_policy::{BlockNotice, Mitigation, PageState};
use pageguard_telemetry::{cleanup_exempt_records, JsonFileStore, LogNotifier, SettingsStore, Statistics, StatisticsRecorder};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "pageguard")]
#[command(about = "PageGuard child-safety page analyzer", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "pageguard.yaml")]
    config: PathBuf,

    /// Model backend URL (OpenAI-compatible)
    #[arg(short, long, env = "PAGEGUARD_BACKEND_URL")]
    backend: Option<String>,

    /// Model name
    #[arg(short, long, env = "PAGEGUARD_MODEL")]
    model: Option<String>,

    /// Model backend API key
    #[arg(long, env = "PAGEGUARD_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Settings store file
    #[arg(short, long, env = "PAGEGUARD_STORE")]
    store: Option<PathBuf>,

    /// Fetch broker URL for cross-origin images
    #[arg(long, env = "PAGEGUARD_FETCH_PROXY")]
    fetch_proxy: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a recorded page snapshot and print a JSON report
    Scan {
        /// Snapshot file
        page: PathBuf,
    },

    /// Run the fetch broker
    Serve {
        /// Listen address
        #[arg(short, long, env = "PAGEGUARD_LISTEN")]
        listen: Option<String>,
    },

    /// Remove social and search sites from the block list
    Cleanup,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            backend_url: self.backend.clone(),
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            store_path: self.store.clone(),
            fetch_proxy_url: self.fetch_proxy.clone(),
            listen: match &self.command {
                Command::Serve { listen } => listen.clone(),
                _ => None,
            },
        }
    }
}

/// What `pageguard scan` prints
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanReport {
    url: String,
    mode: &'static str,
    state: SessionState,
    page: PageState,
    progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<BlockNotice>,
    mitigations: Vec<Mitigation>,
    blocked_nodes: Vec<NodeId>,
    statistics: Statistics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config = AgentConfig::load(&cli.config, cli.overrides())?;
    info!("Configuration loaded");
    info!("Backend: {} ({})", config.backend.base_url, config.backend.model);
    info!("Store: {}", config.store_path.display());

    match cli.command {
        Command::Scan { page } => scan(config, page).await,
        Command::Serve { .. } => serve(config).await,
        Command::Cleanup => cleanup(config).await,
    }
}

async fn scan(config: AgentConfig, page: PathBuf) -> Result<()> {
    let snapshot = PageSnapshot::from_file(&page)?;
    let resources = snapshot.decoded_resources();
    let document = Arc::new(SnapshotDocument::new(snapshot));
    let store: Arc<dyn SettingsStore> = Arc::new(JsonFileStore::new(&config.store_path));

    let client = reqwest::Client::new();
    let direct = StaticResources::new(resources)
        .with_fallback(Arc::new(HttpResourceFetcher::new(client.clone()).with_timeout(config.fetch_timeout())));
    let mut loader = ImageLoader::new(Arc::new(direct));
    if let Some(proxy_url) = &config.fetch_proxy_url {
        loader = loader.with_proxy(Arc::new(HttpFetchProxy::new(client.clone(), proxy_url)));
    }

    let ctx = AgentContext {
        document: document.clone(),
        store: store.clone(),
        notifier: Arc::new(LogNotifier),
        loader: Arc::new(loader),
        filter: Arc::new(CandidateFilter::default()),
        cache: Arc::new(ResultCache::default()),
    };
    let model = HttpLanguageModel::with_client(client, config.backend.clone());

    let mut agent = PageAgent::new(ctx, ClassifierSource::Model(Arc::new(model)));
    let session = agent.start_visit().await;

    let report = ScanReport {
        url: session.location().href().to_string(),
        mode: session.mode().label(),
        state: session.state(),
        page: session.page_state(),
        progress: session.progress(),
        notice: session.notice(),
        mitigations: document.mitigations(),
        blocked_nodes: document.blocked_nodes(),
        statistics: StatisticsRecorder::new(store).snapshot().await,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn serve(config: AgentConfig) -> Result<()> {
    let metrics_handle = init_metrics()?;
    let state = BrokerState::with_metrics(reqwest::Client::new(), config.fetch_timeout(), metrics_handle);
    let app = create_router(state);

    let addr: SocketAddr = config.listen.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Fetch broker listening on http://{}", addr);

    let shutdown = async {
        shutdown_signal().await;
        warn!("Shutdown signal received, stopping server...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn cleanup(config: AgentConfig) -> Result<()> {
    let store = JsonFileStore::new(&config.store_path);
    let removed = cleanup_exempt_records(&store).await?;
    info!("Removed {} social/search entries from the block list", removed);
    println!("{}", removed);
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("pageguard=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pageguard=info"))
    };

    // Logs go to stderr so `scan` output stays valid JSON
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    pageguard_telemetry::metrics::describe_metrics();
    metrics::describe_counter!(pageguard_agent::routes::BROKER_FETCHES_TOTAL, "Broker image fetches by outcome");

    info!("Metrics exporter initialized");
    Ok(handle)
}
