//! Main ledger orchestration layer
//!
//! This module ties together storage, validation, and the writer actor
//! into a high-level API for credit operations.
//!
//! # Example
//!
//! ```no_run
//! use credit_ledger::{Config, Ledger, TransactionKind};
//!
//! #[tokio::main]
//! async fn main() -> credit_ledger::Result<()> {
//!     let config = Config::default();
//!     let ledger = Ledger::open(config).await?;
//!
//!     let user = credit_ledger::UserId::new("user-1");
//!     ledger.create_account(user.clone()).await?;
//!     let receipt = ledger
//!         .apply(user, -5, TransactionKind::Deduction, "text generation")
//!         .await?;
//!     assert_eq!(receipt.new_balance, 95);
//!
//!     Ok(())
//! }
//! ```

use crate::{
    actor::{spawn_writer_actor, WriterHandle},
    audit::{audit_all_balances, AuditReport},
    metrics::Metrics,
    types::{Balance, BalanceUpdate, Receipt, TransactionKind, UserId},
    Config, Error, Result, Storage,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Capacity of the balance-update broadcast channel. Slow subscribers
/// lag rather than block the ledger.
const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Main ledger interface
pub struct Ledger {
    /// Writer handle for serialized mutations
    handle: WriterHandle,

    /// Direct storage access (for reads)
    storage: Arc<Storage>,

    /// Balance-update notifications
    updates: broadcast::Sender<BalanceUpdate>,

    /// Metrics (if attached)
    metrics: Option<Metrics>,

    /// Configuration
    config: Config,
}

impl Ledger {
    /// Open ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let handle = spawn_writer_actor(storage.clone());
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        Ok(Self {
            handle,
            storage,
            updates,
            metrics: None,
            config,
        })
    }

    /// Attach a metrics collector
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Direct storage access for read-side components
    pub fn storage(&self) -> Arc<Storage> {
        self.storage.clone()
    }

    /// Ledger configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Attached metrics collector, if any
    pub fn metrics(&self) -> Option<&Metrics> {
        self.metrics.as_ref()
    }

    /// Subscribe to balance-update notifications
    ///
    /// Emitted after every committed operation; replaces the polling loop
    /// a caller would otherwise run against `balance()`.
    pub fn subscribe(&self) -> broadcast::Receiver<BalanceUpdate> {
        self.updates.subscribe()
    }

    /// Apply one ledger operation atomically
    ///
    /// Validates the inputs, then executes the read-check-write-append
    /// sequence on the single writer task. Exactly one balance update and
    /// one transaction insert happen, or neither.
    pub async fn apply(
        &self,
        user_id: UserId,
        amount: i64,
        kind: TransactionKind,
        description: impl Into<String>,
    ) -> Result<Receipt> {
        let description = description.into();
        self.validate_amount(amount, kind)?;
        self.validate_description(&description)?;

        let started = Instant::now();
        let result = self
            .handle
            .apply(user_id.clone(), amount, kind, description)
            .await;

        match &result {
            Ok(receipt) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_transaction();
                    metrics.record_apply_duration(started.elapsed().as_secs_f64());
                }
                let _ = self.updates.send(BalanceUpdate {
                    user_id,
                    transaction_id: receipt.transaction_id,
                    new_balance: receipt.new_balance,
                });
            }
            Err(Error::InsufficientCredits { .. }) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_insufficient();
                }
            }
            Err(_) => {}
        }

        result
    }

    /// Create a user's balance row with the configured registration bonus
    ///
    /// The grant is itself logged as a `Bonus` transaction, so replaying a
    /// user's history from zero always reproduces the stored balance.
    pub async fn create_account(&self, user_id: UserId) -> Result<Receipt> {
        Self::validate_user_id(&user_id)?;

        let grant = self.config.credits.registration_bonus;
        let receipt = self.handle.create_account(user_id.clone(), grant).await?;

        if grant > 0 {
            if let Some(metrics) = &self.metrics {
                metrics.record_transaction();
            }
            let _ = self.updates.send(BalanceUpdate {
                user_id: user_id.clone(),
                transaction_id: receipt.transaction_id,
                new_balance: receipt.new_balance,
            });
        }

        tracing::info!(user_id = %user_id, balance = receipt.new_balance, "Account created");

        Ok(receipt)
    }

    /// Get current balance for a user
    pub async fn balance(&self, user_id: &UserId) -> Result<Balance> {
        self.storage.get_balance(user_id)
    }

    /// Run one reconciliation pass over every balance row
    ///
    /// Read-only. When a metrics collector is attached, the
    /// imbalanced-accounts gauge is set from the report.
    pub fn audit(&self) -> Result<AuditReport> {
        let report = audit_all_balances(&self.storage)?;
        if let Some(metrics) = &self.metrics {
            metrics.update_imbalanced_accounts(report.summary.imbalanced as i64);
        }
        Ok(report)
    }

    /// Shutdown ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }

    // Input validation (rejected before any store access)

    fn validate_amount(&self, amount: i64, kind: TransactionKind) -> Result<()> {
        if amount == 0 {
            return Err(Error::InvalidAmount("Amount must be non-zero".to_string()));
        }

        let ceiling = self.config.credits.max_single_operation_amount;
        if amount.saturating_abs() > ceiling {
            return Err(Error::InvalidAmount(format!(
                "Amount magnitude {} exceeds per-operation ceiling {}",
                amount.saturating_abs(),
                ceiling
            )));
        }

        if !kind.sign_matches(amount) {
            return Err(Error::InvalidAmount(format!(
                "Amount {} disagrees with kind {}",
                amount, kind
            )));
        }

        Ok(())
    }

    fn validate_description(&self, description: &str) -> Result<()> {
        if description.trim().is_empty() {
            return Err(Error::InvalidDescription(
                "Description must not be empty".to_string(),
            ));
        }

        let max = self.config.credits.max_description_len;
        if description.chars().count() > max {
            return Err(Error::InvalidDescription(format!(
                "Description exceeds {} characters",
                max
            )));
        }

        Ok(())
    }

    fn validate_user_id(user_id: &UserId) -> Result<()> {
        if user_id.as_str().is_empty() {
            return Err(Error::InvalidUserId("User id must not be empty".to_string()));
        }
        // NUL would collide with the history index separator
        if user_id.as_bytes().contains(&0) {
            return Err(Error::InvalidUserId(
                "User id must not contain NUL".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        (Ledger::open(config).await.unwrap(), temp_dir)
    }

    #[tokio::test]
    async fn test_ledger_open() {
        let (ledger, _temp) = create_test_ledger().await;
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_registration_grant() {
        let (ledger, _temp) = create_test_ledger().await;
        let user = UserId::new("u1");

        let receipt = ledger.create_account(user.clone()).await.unwrap();
        assert_eq!(receipt.new_balance, 100);

        let balance = ledger.balance(&user).await.unwrap();
        assert_eq!(balance.balance, 100);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_unknown_user() {
        let (ledger, _temp) = create_test_ledger().await;

        let result = ledger
            .apply(
                UserId::new("ghost"),
                -5,
                TransactionKind::Deduction,
                "gen",
            )
            .await;
        assert!(matches!(result, Err(Error::UserNotFound(_))));

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_validation_rejected_before_storage() {
        let (ledger, _temp) = create_test_ledger().await;
        let user = UserId::new("u1");
        ledger.create_account(user.clone()).await.unwrap();

        // Zero amount
        let result = ledger
            .apply(user.clone(), 0, TransactionKind::Bonus, "zero")
            .await;
        assert!(matches!(result, Err(Error::InvalidAmount(_))));

        // Over the ceiling
        let result = ledger
            .apply(user.clone(), 10_001, TransactionKind::Recharge, "big")
            .await;
        assert!(matches!(result, Err(Error::InvalidAmount(_))));

        // Extreme magnitude must not reach the writer task
        let result = ledger
            .apply(user.clone(), i64::MIN, TransactionKind::Deduction, "min")
            .await;
        assert!(matches!(result, Err(Error::InvalidAmount(_))));

        // Sign disagrees with kind
        let result = ledger
            .apply(user.clone(), 5, TransactionKind::Deduction, "wrong sign")
            .await;
        assert!(matches!(result, Err(Error::InvalidAmount(_))));

        // Empty description
        let result = ledger
            .apply(user.clone(), -5, TransactionKind::Deduction, "  ")
            .await;
        assert!(matches!(result, Err(Error::InvalidDescription(_))));

        // Over-length description
        let long = "x".repeat(501);
        let result = ledger
            .apply(user.clone(), -5, TransactionKind::Deduction, long)
            .await;
        assert!(matches!(result, Err(Error::InvalidDescription(_))));

        // None of the rejected calls touched the ledger
        let balance = ledger.balance(&user).await.unwrap();
        assert_eq!(balance.balance, 100);
        assert_eq!(balance.version, 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_emits_balance_update() {
        let (ledger, _temp) = create_test_ledger().await;
        let user = UserId::new("u1");
        ledger.create_account(user.clone()).await.unwrap();

        let mut updates = ledger.subscribe();
        let receipt = ledger
            .apply(user.clone(), -40, TransactionKind::Deduction, "video render")
            .await
            .unwrap();

        let update = updates.recv().await.unwrap();
        assert_eq!(update.user_id, user);
        assert_eq!(update.transaction_id, receipt.transaction_id);
        assert_eq!(update.new_balance, 60);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_metrics_track_outcomes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let metrics = Metrics::new().unwrap();
        let ledger = Ledger::open(config)
            .await
            .unwrap()
            .with_metrics(metrics.clone());

        let user = UserId::new("u1");
        ledger.create_account(user.clone()).await.unwrap();
        ledger
            .apply(user.clone(), -30, TransactionKind::Deduction, "gen")
            .await
            .unwrap();
        let _ = ledger
            .apply(user.clone(), -200, TransactionKind::Deduction, "gen")
            .await;

        assert_eq!(metrics.transactions_total.get(), 2); // grant + deduction
        assert_eq!(metrics.insufficient_total.get(), 1);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_audit_sets_imbalanced_gauge() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let metrics = Metrics::new().unwrap();
        let ledger = Ledger::open(config)
            .await
            .unwrap()
            .with_metrics(metrics.clone());

        let user = UserId::new("u1");
        ledger.create_account(user.clone()).await.unwrap();

        let report = ledger.audit().unwrap();
        assert_eq!(report.summary.imbalanced, 0);
        assert_eq!(metrics.imbalanced_accounts.get(), 0);

        // Corrupt the balance row, bypassing the log
        let mut corrupted = ledger.storage().get_balance(&user).unwrap();
        corrupted.balance = 999;
        ledger.storage().put_balance(&corrupted).unwrap();

        let report = ledger.audit().unwrap();
        assert_eq!(report.summary.imbalanced, 1);
        assert_eq!(metrics.imbalanced_accounts.get(), 1);

        ledger.shutdown().await.unwrap();
    }
}
