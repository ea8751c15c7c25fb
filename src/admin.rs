//! Privileged admin operations
//!
//! Manual credit adjustments route through the same ledger processor as
//! everything else; what this module adds is operator attribution. Every
//! successful adjustment writes one [`AdminOperationRecord`] to a separate
//! append-only audit trail. That second write is best-effort: its failure
//! is logged as a reconciliation gap, never rolled back, because the
//! ledger transaction has already committed.
//!
//! Full privilege checks live in the external auth layer; this module only
//! rejects identities with no operator id.

use crate::{
    types::{AdminOperation, AdminOperationRecord, Receipt, TransactionKind, UserId},
    Error, Ledger, Result,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Authenticated operator identity plus request metadata
#[derive(Debug, Clone)]
pub struct AdminIdentity {
    /// Operator id (from the external auth layer)
    pub admin_id: String,

    /// Request origin IP
    pub ip_address: Option<String>,

    /// Request user agent
    pub user_agent: Option<String>,
}

impl AdminIdentity {
    /// Identity with no request metadata
    pub fn new(admin_id: impl Into<String>) -> Self {
        Self {
            admin_id: admin_id.into(),
            ip_address: None,
            user_agent: None,
        }
    }
}

/// Whether an adjustment grants or removes credits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Grant credits (bonus)
    Add,
    /// Remove credits (deduction)
    Subtract,
}

/// Privileged interface over the ledger
pub struct AdminInterface {
    ledger: Arc<Ledger>,
}

impl AdminInterface {
    /// Create admin interface
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    /// Manually grant or remove credits, with attribution
    ///
    /// `amount` must be positive; `direction` selects the sign. The ledger
    /// transaction carries kind `Bonus` (Add) or `Deduction` (Subtract)
    /// and a description prefixed with the operator id.
    pub async fn adjust_credits(
        &self,
        admin: &AdminIdentity,
        user_id: UserId,
        amount: i64,
        description: &str,
        direction: Direction,
    ) -> Result<Receipt> {
        Self::authorize(admin)?;

        if amount <= 0 {
            return Err(Error::InvalidAmount(
                "Adjustment amount must be positive".to_string(),
            ));
        }

        let (signed, kind) = match direction {
            Direction::Add => (amount, TransactionKind::Bonus),
            Direction::Subtract => (-amount, TransactionKind::Deduction),
        };
        let attributed = format!("[admin:{}] {}", admin.admin_id, description);

        let receipt = self
            .ledger
            .apply(user_id.clone(), signed, kind, attributed.clone())
            .await?;

        if let Some(metrics) = self.ledger.metrics() {
            metrics.record_admin_adjustment();
        }

        // Balance math off the receipt: the apply has already committed,
        // so this pair is exact even under concurrent traffic.
        let after = receipt.new_balance;
        let before = after - signed;

        let record = AdminOperationRecord {
            id: Uuid::now_v7(),
            admin_id: admin.admin_id.clone(),
            operation: AdminOperation::AdjustCredits,
            target_user: Some(user_id.clone()),
            credit_amount: Some(signed),
            before_balance: Some(before),
            after_balance: Some(after),
            description: attributed,
            ip_address: admin.ip_address.clone(),
            user_agent: admin.user_agent.clone(),
            created_at: Utc::now(),
        };
        self.record_best_effort(&record, &receipt);

        Ok(receipt)
    }

    /// Admin-driven account creation with the registration grant
    pub async fn create_member(&self, admin: &AdminIdentity, user_id: UserId) -> Result<Receipt> {
        Self::authorize(admin)?;

        let receipt = self.ledger.create_account(user_id.clone()).await?;

        let record = AdminOperationRecord {
            id: Uuid::now_v7(),
            admin_id: admin.admin_id.clone(),
            operation: AdminOperation::CreateMember,
            target_user: Some(user_id),
            credit_amount: Some(receipt.new_balance),
            before_balance: Some(0),
            after_balance: Some(receipt.new_balance),
            description: format!("[admin:{}] member created", admin.admin_id),
            ip_address: admin.ip_address.clone(),
            user_agent: admin.user_agent.clone(),
            created_at: Utc::now(),
        };
        self.record_best_effort(&record, &receipt);

        Ok(receipt)
    }

    /// Record an admin session opening
    pub fn record_login(&self, admin: &AdminIdentity) -> Result<()> {
        Self::authorize(admin)?;
        self.record_session(admin, AdminOperation::Login)
    }

    /// Record an admin session closing
    pub fn record_logout(&self, admin: &AdminIdentity) -> Result<()> {
        Self::authorize(admin)?;
        self.record_session(admin, AdminOperation::Logout)
    }

    fn record_session(&self, admin: &AdminIdentity, operation: AdminOperation) -> Result<()> {
        let record = AdminOperationRecord {
            id: Uuid::now_v7(),
            admin_id: admin.admin_id.clone(),
            operation,
            target_user: None,
            credit_amount: None,
            before_balance: None,
            after_balance: None,
            description: operation.code().to_string(),
            ip_address: admin.ip_address.clone(),
            user_agent: admin.user_agent.clone(),
            created_at: Utc::now(),
        };
        self.ledger.storage().append_admin_record(&record)
    }

    /// Append the audit record; the ledger write has already committed, so
    /// a failure here is a reconciliation gap to report, not to roll back.
    fn record_best_effort(&self, record: &AdminOperationRecord, receipt: &Receipt) {
        if let Err(e) = self.ledger.storage().append_admin_record(record) {
            tracing::error!(
                transaction_id = %receipt.transaction_id,
                admin_id = %record.admin_id,
                error = %e,
                "Admin audit record lost; ledger transaction committed without attribution"
            );
        }
    }

    fn authorize(admin: &AdminIdentity) -> Result<()> {
        if admin.admin_id.trim().is_empty() {
            return Err(Error::Unauthorized(
                "Admin identity carries no operator id".to_string(),
            ));
        }
        Ok(())
    }
}
