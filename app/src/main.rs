mod api;
mod config;
mod logging;
mod services;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use domain::core::StockSim;

use crate::config::AppConfig;
use crate::services::SimHandle;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let dotenv = config::load_dotenv()?;
    let config = AppConfig::from_env()?;

    // Initialize logging
    logging::init()?;
    tracing::info!("Starting StockSim application");
    if let Some(path) = dotenv {
        tracing::info!("Loaded environment from {}", path.display());
    }
    tracing::debug!("Configuration: {config:#?}");

    let sim = StockSim::open(config.db_path.clone(), config.sim.clone())
        .await
        .wrap_err_with(|| format!("Failed to open store at {}", config.db_path.display()))?;
    tracing::info!("Using store at {}", config.db_path.display());

    let app = api::create_api(SimHandle::new(sim));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server running on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
