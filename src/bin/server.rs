//! Credit ledger server binary
//!
//! Opens the ledger and serves until interrupted. Transport wiring
//! (HTTP handlers for apply/history/adjust) lives in the host
//! application; this binary exists for standalone operation and smoke
//! testing.

use credit_ledger::{Config, Ledger, Metrics};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting credit ledger server");

    let config = Config::from_env()?;
    let metrics = Metrics::new()?;

    let ledger = Ledger::open(config).await?.with_metrics(metrics);
    tracing::info!("Ledger opened successfully");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down credit ledger server");
    ledger.shutdown().await?;

    Ok(())
}
