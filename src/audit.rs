//! Reconciliation auditor
//!
//! Batch job that recomputes every user's expected balance from the
//! transaction log and compares it against the materialized balance row.
//! The registration grant is itself logged as a bonus transaction, so the
//! expected balance is exactly the sum of the user's transaction amounts.
//!
//! Strictly read-only: drift is reported, never auto-corrected. Correction
//! is a separate manual admin action routed through the processor.

use crate::{
    types::{Balance, UserId},
    Result, Storage,
};
use serde::Serialize;

/// Drift check result for one user
#[derive(Debug, Clone, Serialize)]
pub struct AccountAudit {
    /// User audited
    pub user_id: UserId,

    /// Live balance-store value
    pub actual: i64,

    /// Sum of the user's transaction amounts
    pub expected: i64,

    /// `actual - expected`
    pub difference: i64,

    /// No drift detected
    pub is_balanced: bool,
}

/// One user whose audit step failed; the batch continues past these
#[derive(Debug, Clone, Serialize)]
pub struct AuditFailure {
    /// User that could not be audited
    pub user_id: UserId,

    /// Underlying error
    pub error: String,
}

/// Aggregate audit counts
#[derive(Debug, Clone, Serialize)]
pub struct AuditSummary {
    /// Users with a balance row
    pub total_users: usize,

    /// Users with no drift
    pub balanced: usize,

    /// Users with drift
    pub imbalanced: usize,

    /// Users whose audit step failed
    pub failed: usize,

    /// Sum of all differences (signed)
    pub total_drift: i64,
}

/// Full audit report, worst drift first
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    /// Per-user results, sorted by |difference| descending
    pub results: Vec<AccountAudit>,

    /// Users skipped after a storage failure
    pub failures: Vec<AuditFailure>,

    /// Aggregate counts
    pub summary: AuditSummary,
}

/// Audit every user with a balance row
///
/// Tolerates per-user failures: a user whose history cannot be read is
/// logged, reported under `failures`, and the batch continues.
pub fn audit_all_balances(storage: &Storage) -> Result<AuditReport> {
    let balances = storage.all_balances()?;

    let mut results = Vec::with_capacity(balances.len());
    let mut failures = Vec::new();

    for balance in &balances {
        match audit_one(storage, balance) {
            Ok(audit) => {
                if !audit.is_balanced {
                    tracing::warn!(
                        user_id = %audit.user_id,
                        actual = audit.actual,
                        expected = audit.expected,
                        difference = audit.difference,
                        "Balance drift detected"
                    );
                }
                results.push(audit);
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %balance.user_id,
                    error = %e,
                    "Audit step failed, skipping user"
                );
                failures.push(AuditFailure {
                    user_id: balance.user_id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    // Worst drift first, for operator triage
    results.sort_by_key(|audit| std::cmp::Reverse(audit.difference.abs()));

    let balanced = results.iter().filter(|a| a.is_balanced).count();
    let total_drift = results.iter().map(|a| a.difference).sum();

    let summary = AuditSummary {
        total_users: balances.len(),
        balanced,
        imbalanced: results.len() - balanced,
        failed: failures.len(),
        total_drift,
    };

    tracing::info!(
        total_users = summary.total_users,
        balanced = summary.balanced,
        imbalanced = summary.imbalanced,
        failed = summary.failed,
        total_drift = summary.total_drift,
        "Reconciliation audit complete"
    );

    Ok(AuditReport {
        results,
        failures,
        summary,
    })
}

fn audit_one(storage: &Storage, balance: &Balance) -> Result<AccountAudit> {
    let expected: i64 = storage
        .user_transactions(&balance.user_id)?
        .iter()
        .map(|txn| txn.amount)
        .sum();

    let difference = balance.balance - expected;

    Ok(AccountAudit {
        user_id: balance.user_id.clone(),
        actual: balance.balance,
        expected,
        difference,
        is_balanced: difference == 0,
    })
}
