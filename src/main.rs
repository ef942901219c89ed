mod config;
mod error;
mod handlers;
mod languages;
mod ocr_fallback;
mod prescription;
mod routes;
mod session;
mod state;
mod types;
mod uploads;
mod vision_llm;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use state::AppState;

const DEFAULT_LOG_FILTER: &str = "rxlate_backend=info,tower_http=debug";

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal outside development.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "conf.yaml".to_string());
    let config = Config::load(Some(config_path.as_str()))?;
    info!("Loaded configuration (file: {})", config_path);

    // Initialize app state
    let app_state = AppState::new(config.clone()).await?;
    info!(
        "Vision model: {} (mocked: {}), fallback OCR: {}",
        config.llm_config.llm_provider,
        app_state.prescriptions.is_mocked(),
        app_state.prescriptions.fallback_enabled()
    );
    info!("Sessions loaded: {}", app_state.sessions.len().await);

    let _pruner = app_state
        .uploads
        .clone()
        .spawn_pruner(Duration::from_secs(config.upload_config.prune_interval_secs));

    // Build application
    let app = routes::create_routes(app_state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.system_config.host, config.system_config.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid listen address {}:{}",
                config.system_config.host, config.system_config.port
            )
        })?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
