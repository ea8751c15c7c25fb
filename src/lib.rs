//! Credit Ledger Core
//!
//! Per-user credit balances with an append-only transaction log,
//! batch reconciliation, and attributed admin adjustments.
//!
//! # Architecture
//!
//! - **Single Writer**: One logical writer task serializes every mutation,
//!   so concurrent deductions can never double-spend a stale balance
//! - **Atomic Commit**: Balance update and transaction append land in one
//!   WriteBatch, all-or-nothing
//! - **Append-only**: Transactions and admin records are never modified
//!   or deleted
//!
//! # Invariants
//!
//! - Non-negativity: balance >= 0 after every committed operation
//! - Replay consistency: balance == Σ(transaction amounts) for every user
//! - Per-user ordering: created_at is non-decreasing in commit order

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub(crate) mod actor;
pub mod admin;
pub mod audit;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod query;
pub mod storage;
pub mod types;

// Re-exports
pub use admin::{AdminIdentity, AdminInterface, Direction};
pub use audit::{audit_all_balances, AuditReport};
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use metrics::Metrics;
pub use query::{HistoryFilter, HistoryPage, Pagination, QueryService};
pub use storage::Storage;
pub use types::{
    AdminOperation, AdminOperationRecord, Balance, BalanceUpdate, Receipt, Transaction,
    TransactionKind, UserId,
};
