use std::sync::Arc;
use tracing::{error, info};

use apid::collectors::global::ExternalApis;
use apid::{Config, Scheduler, StatsEngine};
use pool_store::SqliteStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_args()?;
    info!("Starting apid");
    info!("Store: {}", config.db_path);
    if config.secondary {
        info!("Running as secondary: rollup generation disabled");
    }

    let store = Arc::new(SqliteStore::new(&config.db_path).await?);
    let apis = ExternalApis::new(&config);
    let engine = Arc::new(StatsEngine::new(store, apis, config));

    info!("apid initialized");

    // Runs forever; only a fatal cold-start condition comes back.
    let scheduler = Scheduler::new(engine);
    if let Err(e) = scheduler.run().await {
        error!("Fatal error collecting stats: {}", e);
        return Err(e.into());
    }

    Ok(())
}
