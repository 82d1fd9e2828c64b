//! farmdesk - HTTP Server Entry Point
//!
//! Starts the HTTP server that exposes the farm API.

use farmdesk::{api, config::Config};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "farmdesk=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Loaded configuration: store={:?}, data_dir={}, dev_mode={}",
        config.store,
        config.data_dir.display(),
        config.dev_mode
    );
    if config.auth.bootstrap_owner.is_none() {
        info!("No FARMDESK_OWNER_USERNAME set; existing accounts only");
    }

    api::serve(config).await?;

    Ok(())
}
