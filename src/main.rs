use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use stakewatch::config::Config;
use stakewatch::feed::HttpFeedSource;
use stakewatch::monitor::Monitor;
use stakewatch::notify::Hub;
use stakewatch::server::{create_router, AppState};
use stakewatch::store::Store;

#[derive(Parser)]
#[command(name = "stakewatch")]
#[command(about = "Violation-monitoring daemon for social staking circles")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "stakewatch.toml")]
    config: String,

    /// Data directory
    #[arg(short, long, env = "STAKEWATCH_DATA_DIR")]
    data_dir: Option<String>,

    /// Feed provider API key (overrides config file)
    #[arg(long, env = "STAKEWATCH_FEED_API_KEY")]
    feed_api_key: Option<String>,

    /// HTTP API port (overrides config file)
    #[arg(long, env = "STAKEWATCH_HTTP_PORT")]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stakewatch=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting stakewatch");
    info!("Config file: {}", cli.config);

    // Load or create default config
    let mut config: Config = if std::path::Path::new(&cli.config).exists() {
        let content = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&content)?
    } else {
        info!("Config file not found, using defaults");
        Config::default()
    };

    // Apply CLI overrides
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = PathBuf::from(data_dir);
    }
    if let Some(api_key) = cli.feed_api_key {
        config.feed.api_key = api_key;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }

    if config.feed.api_key.is_empty() {
        info!("No feed API key configured; scans will fail upstream until one is set");
    }

    info!("Data dir: {}", config.storage.data_dir.display());

    // Wire components
    let store = Arc::new(Store::open(&config.storage.data_dir)?);
    let hub = Arc::new(Hub::default());
    let feed = Arc::new(HttpFeedSource::new(&config.feed)?);
    let monitor = Arc::new(Monitor::new(
        config.monitor.clone(),
        config.feed.page_limit,
        store.clone(),
        feed,
        hub.clone(),
    ));

    // Start the scheduled loop in the background
    if config.monitor.enabled {
        let loop_monitor = monitor.clone();
        tokio::spawn(async move {
            loop_monitor.run().await;
        });
        info!(
            interval_secs = config.monitor.poll_interval_secs,
            "Monitor loop started in background"
        );
    } else {
        info!("Monitor loop is disabled; only manual scans will run");
    }

    // Serve the API
    let state = Arc::new(AppState {
        store,
        hub,
        monitor: monitor.clone(),
    });
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.api.http_port));
    info!("API listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    monitor.stop().await;

    Ok(())
}
