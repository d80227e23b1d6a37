use anyhow::Context;
use dotenvy as dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use raffle_storefront::cache::QueryCache;
use raffle_storefront::config::{Config, DataBackendKind};
use raffle_storefront::db::{DataClient, MemoryBackend};
use raffle_storefront::raffle::{ManagerSettings, RaffleManager};
use raffle_storefront::session::SessionHolder;
use raffle_storefront::{router, spawn_session_watcher, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // trying multiple .env locations since working directory differs between dev and prod
    let _ = dotenv::from_filename_override(".env");
    let _ = dotenv::from_filename_override(concat!(env!("CARGO_MANIFEST_DIR"), "/.env"));
    let _ = dotenv::dotenv_override();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,raffle_storefront=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Raffle Storefront");

    // the storefront cannot do anything without its data backend, so a missing
    // endpoint or key stops startup here
    tracing::info!("Loading configuration from environment");
    let config = Config::from_env().context("error with configuration")?;
    tracing::info!("Configuration loaded successfully");

    let session = SessionHolder::new();

    tracing::info!("Initializing data client...");
    let data = match config.data_backend {
        DataBackendKind::Rest => DataClient::rest(&config, session.clone())
            .context("Failed to initialize data client")?,
        DataBackendKind::Memory => {
            tracing::warn!("Using the in-memory data backend, nothing will be persisted");
            let backend = MemoryBackend::new();

            if let Some(path) = &config.memory_seed_path {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read fixtures from {}", path))?;
                let document: serde_json::Value = serde_json::from_str(&raw)
                    .with_context(|| format!("Fixtures in {} are not valid JSON", path))?;
                let loaded = backend
                    .load_fixtures(&document)
                    .context("Failed to load fixtures")?;
                tracing::info!("Loaded {} fixture rows from {}", loaded, path);
            }

            DataClient::memory(backend)
        }
    };

    let cache = QueryCache::new(config.query_retry_attempts, Duration::from_secs(1)).with_limits(
        config.query_cache_max_entries,
        Duration::from_secs(config.query_cache_max_age_seconds),
    );
    let _session_watcher = spawn_session_watcher(&session, cache.clone());

    // sweeping expired entries in the background so lookups of one-off ids don't pile up
    let cleanup_cache = cache.clone();
    tokio::spawn(async move {
        tracing::info!("Starting periodic query cache cleanup");
        cleanup_cache.run_periodic_cleanup(Duration::from_secs(60)).await;
    });

    let raffle_manager = Arc::new(RaffleManager::new(
        data,
        cache,
        ManagerSettings::from(&config),
    ));

    let app_state = Arc::new(AppState {
        raffle_manager,
        session,
        config: Arc::new(config.clone()),
    });

    let app = router(app_state);

    // in case the configured port is taken, try a few more before giving up
    let host: std::net::IpAddr = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST: {}", config.host))?;
    let mut port = config.port;
    let mut listener = None;

    for _ in 0..10u16 {
        let addr = SocketAddr::new(host, port);
        match tokio::net::TcpListener::bind(&addr).await {
            Ok(l) => {
                listener = Some((addr, l));
                break;
            }
            Err(e) => {
                tracing::warn!("Failed to bind to {}: {} (trying next port)", addr, e);
                port = port.saturating_add(1);
            }
        }
    }

    let (addr, listener) = listener.ok_or_else(|| anyhow::anyhow!(
        "Failed to bind to any port in range {}..{}",
        config.port,
        config.port.saturating_add(9)
    ))?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
