//! Runs the ladder sweeper against PostgreSQL until interrupted.
//!
//! Reads `DATABASE_URL`, the `LADDER_*` variables understood by
//! [`LadderConfig::from_env`] and the telemetry variables understood by
//! [`TelemetryConfig::from_env`].

use std::sync::Arc;

use ladder::config::LadderConfig;
use ladder::engine::Ladder;
use ladder::storage::PgStore;
use ladder::telemetry::{self, TelemetryConfig};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _telemetry = telemetry::init(TelemetryConfig::from_env())?;

    let url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?;
    let config = LadderConfig::from_env()?;

    let store = PgStore::connect(&url).await?;
    store.migrate().await?;

    let ladder = Ladder::builder(Arc::new(store)).config(config).build()?;

    let shutdown = CancellationToken::new();
    let handle = ladder.sweeper().spawn(shutdown.clone());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    shutdown.cancel();
    handle.await?;
    Ok(())
}
