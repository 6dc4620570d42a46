use huddle::application::{CallSweeper, PersistenceFacade};
use huddle::config::AppConfig;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Huddle storage service");

    // Load configuration
    let config = AppConfig::load()?;
    info!("Configuration loaded: driver={}", config.storage.driver);

    let facade = PersistenceFacade::open(&config.storage, config.lifecycle).await?;
    info!("Storage backend ready ({})", facade.driver());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper_handle = if config.cleanup.enabled {
        let sweeper = CallSweeper::from_config(facade.backend(), &config.cleanup)?;
        Some(sweeper.spawn(shutdown_rx))
    } else {
        info!("Call cleanup disabled");
        None
    };

    // Keep the service running
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper_handle {
        if let Err(e) = handle.await {
            warn!("Call sweeper ended abnormally: {}", e);
        }
    }

    facade.close().await;
    info!("Storage closed");

    Ok(())
}
