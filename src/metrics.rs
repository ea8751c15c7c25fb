//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `credits_transactions_total` - Total committed ledger transactions
//! - `credits_insufficient_total` - Deductions rejected for insufficient credits
//! - `credits_apply_duration_seconds` - Histogram of apply latencies
//! - `credits_admin_adjustments_total` - Total admin adjustments
//! - `credits_imbalanced_accounts` - Accounts with drift in the last audit

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics collector
///
/// Metrics live in their own registry rather than the process-global one,
/// so multiple ledgers (or test instances) never collide on names.
#[derive(Clone)]
pub struct Metrics {
    /// Total committed transactions
    pub transactions_total: IntCounter,

    /// Deductions rejected for insufficient credits
    pub insufficient_total: IntCounter,

    /// Apply duration histogram
    pub apply_duration: Histogram,

    /// Total admin adjustments
    pub admin_adjustments_total: IntCounter,

    /// Accounts flagged imbalanced by the last audit
    pub imbalanced_accounts: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let transactions_total = IntCounter::with_opts(Opts::new(
            "credits_transactions_total",
            "Total committed ledger transactions",
        ))?;
        registry.register(Box::new(transactions_total.clone()))?;

        let insufficient_total = IntCounter::with_opts(Opts::new(
            "credits_insufficient_total",
            "Deductions rejected for insufficient credits",
        ))?;
        registry.register(Box::new(insufficient_total.clone()))?;

        let apply_duration = Histogram::with_opts(
            HistogramOpts::new(
                "credits_apply_duration_seconds",
                "Histogram of apply latencies",
            )
            .buckets(vec![
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0,
            ]),
        )?;
        registry.register(Box::new(apply_duration.clone()))?;

        let admin_adjustments_total = IntCounter::with_opts(Opts::new(
            "credits_admin_adjustments_total",
            "Total admin adjustments",
        ))?;
        registry.register(Box::new(admin_adjustments_total.clone()))?;

        let imbalanced_accounts = IntGauge::with_opts(Opts::new(
            "credits_imbalanced_accounts",
            "Accounts with drift in the last audit",
        ))?;
        registry.register(Box::new(imbalanced_accounts.clone()))?;

        Ok(Self {
            transactions_total,
            insufficient_total,
            apply_duration,
            admin_adjustments_total,
            imbalanced_accounts,
            registry,
        })
    }

    /// Record a committed transaction
    pub fn record_transaction(&self) {
        self.transactions_total.inc();
    }

    /// Record a rejected deduction
    pub fn record_insufficient(&self) {
        self.insufficient_total.inc();
    }

    /// Record apply duration
    pub fn record_apply_duration(&self, duration_seconds: f64) {
        self.apply_duration.observe(duration_seconds);
    }

    /// Record an admin adjustment
    pub fn record_admin_adjustment(&self) {
        self.admin_adjustments_total.inc();
    }

    /// Update imbalanced account count after an audit
    pub fn update_imbalanced_accounts(&self, count: i64) {
        self.imbalanced_accounts.set(count);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.transactions_total.get(), 0);
        assert_eq!(metrics.insufficient_total.get(), 0);
    }

    #[test]
    fn test_independent_instances() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_transaction();
        assert_eq!(a.transactions_total.get(), 1);
        assert_eq!(b.transactions_total.get(), 0);
    }

    #[test]
    fn test_record_insufficient() {
        let metrics = Metrics::new().unwrap();
        metrics.record_insufficient();
        assert_eq!(metrics.insufficient_total.get(), 1);
    }

    #[test]
    fn test_update_imbalanced_accounts() {
        let metrics = Metrics::new().unwrap();
        metrics.update_imbalanced_accounts(3);
        assert_eq!(metrics.imbalanced_accounts.get(), 3);
    }
}
