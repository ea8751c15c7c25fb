//! Core types for the credit ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (i64 credits, single integer unit)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque user identifier, owned by the external auth subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get as bytes (storage key)
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of balance-affecting event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionKind {
    /// Credits consumed by a metered operation (negative amount)
    Deduction = 1,
    /// Credits granted (registration, promotion, admin grant)
    Bonus = 2,
    /// Credits returned after a failed or cancelled operation
    Refund = 3,
    /// Credits purchased
    Recharge = 4,
}

impl TransactionKind {
    /// Wire/storage code
    pub fn code(&self) -> &'static str {
        match self {
            TransactionKind::Deduction => "deduction",
            TransactionKind::Bonus => "bonus",
            TransactionKind::Refund => "refund",
            TransactionKind::Recharge => "recharge",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deduction" => Some(TransactionKind::Deduction),
            "bonus" => Some(TransactionKind::Bonus),
            "refund" => Some(TransactionKind::Refund),
            "recharge" => Some(TransactionKind::Recharge),
            _ => None,
        }
    }

    /// Whether this kind adds credits (positive amount expected).
    /// Deductions are the only negative-amount kind.
    pub fn is_credit(&self) -> bool {
        !matches!(self, TransactionKind::Deduction)
    }

    /// Check that a signed amount agrees with this kind's semantics.
    pub fn sign_matches(&self, amount: i64) -> bool {
        if self.is_credit() {
            amount > 0
        } else {
            amount < 0
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Materialized balance, one row per user
///
/// Mutated exclusively by the ledger writer; `balance >= 0` after any
/// committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    /// Owner
    pub user_id: UserId,

    /// Current credit count
    pub balance: i64,

    /// Number of transactions applied to this row. Monotonic; gives the
    /// per-user total order used by the history index.
    pub version: u64,

    /// Timestamp of last mutation
    pub updated_at: DateTime<Utc>,
}

impl Balance {
    /// New balance row with an initial grant
    pub fn new(user_id: UserId, initial: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: initial,
            version: 0,
            updated_at: now,
        }
    }

    /// Would applying `amount` drive the balance negative?
    pub fn would_overdraw(&self, amount: i64) -> bool {
        self.balance + amount < 0
    }

    /// Next row state after applying `amount`
    pub fn applied(&self, amount: i64, now: DateTime<Utc>) -> Self {
        Self {
            user_id: self.user_id.clone(),
            balance: self.balance + amount,
            version: self.version + 1,
            updated_at: now,
        }
    }
}

/// Immutable record of one balance-affecting event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Owner
    pub user_id: UserId,

    /// Signed amount: negative for deductions, positive otherwise
    pub amount: i64,

    /// Event kind
    pub kind: TransactionKind,

    /// Free-text reason, 1..=500 chars
    pub description: String,

    /// Immutable creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Result of a successful `apply`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// ID of the transaction that was appended
    pub transaction_id: Uuid,

    /// Balance after the operation committed
    pub new_balance: i64,
}

/// Notification broadcast after every committed `apply`
///
/// Replaces polling: interested callers subscribe instead of re-reading
/// the balance on a timer.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceUpdate {
    /// User whose balance changed
    pub user_id: UserId,

    /// Transaction that caused the change
    pub transaction_id: Uuid,

    /// Balance after the change
    pub new_balance: i64,
}

/// Privileged operation type for the admin audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AdminOperation {
    /// Admin-driven account creation
    CreateMember = 1,
    /// Manual credit grant or deduction
    AdjustCredits = 2,
    /// Admin session opened
    Login = 3,
    /// Admin session closed
    Logout = 4,
}

impl AdminOperation {
    /// Wire/storage code
    pub fn code(&self) -> &'static str {
        match self {
            AdminOperation::CreateMember => "create_member",
            AdminOperation::AdjustCredits => "adjust_credits",
            AdminOperation::Login => "login",
            AdminOperation::Logout => "logout",
        }
    }
}

impl fmt::Display for AdminOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Append-only audit record of a privileged operation
///
/// Distinct from [`Transaction`]: captures who acted, not just what the
/// ledger recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminOperationRecord {
    /// Unique record ID (UUIDv7 for time-ordering)
    pub id: Uuid,

    /// Operator attribution
    pub admin_id: String,

    /// What was performed
    pub operation: AdminOperation,

    /// Target user, if the operation touched one
    pub target_user: Option<UserId>,

    /// Credit amount moved, if any (signed)
    pub credit_amount: Option<i64>,

    /// Target balance before the operation
    pub before_balance: Option<i64>,

    /// Target balance after the operation
    pub after_balance: Option<i64>,

    /// Free-text reason
    pub description: String,

    /// Request origin IP
    pub ip_address: Option<String>,

    /// Request user agent
    pub user_agent: Option<String>,

    /// Record timestamp
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!(
            TransactionKind::from_str("deduction"),
            Some(TransactionKind::Deduction)
        );
        assert_eq!(
            TransactionKind::from_str("recharge"),
            Some(TransactionKind::Recharge)
        );
        assert_eq!(TransactionKind::from_str("INVALID"), None);
    }

    #[test]
    fn test_kind_sign_agreement() {
        assert!(TransactionKind::Deduction.sign_matches(-5));
        assert!(!TransactionKind::Deduction.sign_matches(5));
        assert!(TransactionKind::Bonus.sign_matches(5));
        assert!(!TransactionKind::Refund.sign_matches(-5));
        assert!(!TransactionKind::Recharge.sign_matches(0));
    }

    #[test]
    fn test_balance_overdraw_check() {
        let balance = Balance::new(UserId::new("u1"), 10, Utc::now());
        assert!(!balance.would_overdraw(-10));
        assert!(balance.would_overdraw(-11));
        assert!(!balance.would_overdraw(50));
    }

    #[test]
    fn test_balance_applied_bumps_version() {
        let balance = Balance::new(UserId::new("u1"), 100, Utc::now());
        let next = balance.applied(-30, Utc::now());
        assert_eq!(next.balance, 70);
        assert_eq!(next.version, 1);
        assert_eq!(next.user_id, balance.user_id);
    }
}
