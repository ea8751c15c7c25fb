//! Reconciliation audit binary
//!
//! Runs one drift-detection pass over every balance row and prints the
//! report as JSON. Read-only; safe to run against a live data directory
//! copy or during a maintenance window.

use credit_ledger::{audit_all_balances, Config, Storage};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = Config::from_env()?;
    let storage = Storage::open(&config)?;

    let stats = storage.get_stats()?;
    tracing::info!(
        total_users = stats.total_users,
        total_transactions = stats.total_transactions,
        "Starting reconciliation audit"
    );

    let report = audit_all_balances(&storage)?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.summary.imbalanced > 0 || report.summary.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}
