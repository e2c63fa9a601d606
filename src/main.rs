use anyhow::{Context, Result};
use serde::Deserialize;
use std::{env, fs, net::SocketAddr, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use ksl_cars_rust::{
    config::Settings,
    gateway::ProxyClient,
    routes::{self, AppState},
};

// Define structure for proxy configuration
#[derive(Deserialize, Debug)]
struct ProxyConfig {
    http_proxy: Option<String>,
    https_proxy: Option<String>,
}

// Loads proxyconfig.json and exports it as HTTP(S)_PROXY for reqwest
fn load_and_set_proxy_env_vars() -> Result<()> {
    let config_path = Path::new("proxyconfig.json");
    if !config_path.exists() {
        tracing::info!("proxyconfig.json not found, skipping proxy environment variable setup.");
        return Ok(());
    }

    tracing::info!("Found proxyconfig.json, attempting to load proxy settings...");
    let config_content = fs::read_to_string(config_path).context("Failed to read proxyconfig.json")?;
    let proxy_config: ProxyConfig =
        serde_json::from_str(&config_content).context("Failed to parse proxyconfig.json")?;

    if let Some(http_proxy) = proxy_config.http_proxy.filter(|p| !p.is_empty()) {
        // SAFETY: runs from the synchronous `main` before the tokio runtime is
        // built, while the process is still single-threaded.
        unsafe { env::set_var("HTTP_PROXY", http_proxy) };
        tracing::info!("Set HTTP_PROXY environment variable from config.");
    }
    if let Some(https_proxy) = proxy_config.https_proxy.filter(|p| !p.is_empty()) {
        // SAFETY: see above.
        unsafe { env::set_var("HTTPS_PROXY", https_proxy) };
        tracing::info!("Set HTTPS_PROXY environment variable from config.");
    }
    Ok(())
}

fn main() -> Result<()> {
    // Load .env file first. Ignore errors (e.g., file not found)
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "ksl_cars_rust=info,tower_http=info".into()))
        .with(fmt::layer())
        .init();

    // Environment writes happen here, before any runtime worker thread exists
    if let Err(e) = load_and_set_proxy_env_vars() {
        tracing::warn!("Failed to load or apply proxy configuration: {}", e);
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build the tokio runtime")?
        .block_on(serve())
}

async fn serve() -> Result<()> {
    tracing::info!("Initializing KSL Cars API server...");

    let settings = Settings::new().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded successfully.");

    let proxy_client = ProxyClient::from_settings(&settings).context("Failed to build proxy API client")?;
    tracing::info!(proxy_url = %settings.proxy_url, "Proxy API client created.");

    let addr: SocketAddr = settings
        .server_address
        .parse()
        .with_context(|| format!("Invalid server address format: {}", settings.server_address))?;

    let app_state = AppState {
        settings: Arc::new(settings),
        api: Arc::new(proxy_client),
    };
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to address {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
