//! Read-side balance and history queries
//!
//! Nothing in this module mutates state: current balance, paginated and
//! filterable transaction history, trailing-window usage rate, and the
//! low-balance predicate. Filtering is a straight predicate over stored
//! fields; no amount is ever recomputed here.

use crate::{
    config::CreditsConfig,
    types::{Balance, Transaction, TransactionKind, UserId},
    Error, Result, Storage,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// History query parameters
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// 1-based page number; 0 is treated as 1
    pub page: usize,

    /// Page size; 0 selects the configured default, larger values are
    /// clamped to the configured maximum
    pub limit: usize,

    /// Only transactions of this kind
    pub kind: Option<TransactionKind>,

    /// Only transactions at or after this instant
    pub start: Option<DateTime<Utc>>,

    /// Only transactions at or before this instant
    pub end: Option<DateTime<Utc>>,
}

/// Pagination metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based page number served
    pub page: usize,
    /// Page size used
    pub limit: usize,
    /// Matching transactions across all pages
    pub total: usize,
    /// Page count at this limit
    pub total_pages: usize,
    /// A later page exists
    pub has_next: bool,
    /// An earlier page exists
    pub has_prev: bool,
}

/// One page of reverse-chronological history
#[derive(Debug, Clone)]
pub struct HistoryPage {
    /// Transactions on this page, newest first
    pub transactions: Vec<Transaction>,
    /// Pagination metadata
    pub pagination: Pagination,
}

/// Read-only query service over the ledger stores
pub struct QueryService {
    storage: Arc<Storage>,
    credits: CreditsConfig,
}

impl QueryService {
    /// Create query service
    pub fn new(storage: Arc<Storage>, credits: CreditsConfig) -> Self {
        Self { storage, credits }
    }

    /// Current balance and last-updated timestamp
    pub fn balance(&self, user_id: &UserId) -> Result<Balance> {
        self.storage.get_balance(user_id)
    }

    /// Paginated, reverse-chronological transaction history
    pub fn history(&self, user_id: &UserId, filter: &HistoryFilter) -> Result<HistoryPage> {
        // Surface UserNotFound for unknown users rather than an empty page
        self.storage.get_balance(user_id)?;

        let page = filter.page.max(1);
        let limit = if filter.limit == 0 {
            self.credits.default_page_limit
        } else {
            filter.limit.min(self.credits.max_page_limit)
        };

        let mut matching: Vec<Transaction> = self
            .storage
            .user_transactions(user_id)?
            .into_iter()
            .filter(|txn| Self::matches(txn, filter))
            .collect();

        // Commit order ascending from storage; history reads newest first
        matching.reverse();

        let total = matching.len();
        let total_pages = total.div_ceil(limit);

        // Pages past the end are valid requests and serve an empty page;
        // the skip must not overflow for arbitrary caller-supplied pages
        let transactions: Vec<Transaction> = matching
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();

        Ok(HistoryPage {
            transactions,
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages,
                has_next: page < total_pages,
                has_prev: page > 1 && total > 0,
            },
        })
    }

    /// Average daily deduction volume (absolute credits) over the trailing
    /// `days` window. Display only; never used for enforcement.
    pub fn usage_rate(&self, user_id: &UserId, days: u32) -> Result<f64> {
        if days == 0 {
            return Err(Error::InvalidAmount(
                "Usage window must be at least one day".to_string(),
            ));
        }

        self.storage.get_balance(user_id)?;

        let cutoff = Utc::now() - Duration::days(i64::from(days));
        let consumed: i64 = self
            .storage
            .user_transactions(user_id)?
            .iter()
            .filter(|txn| txn.kind == TransactionKind::Deduction && txn.created_at >= cutoff)
            .map(|txn| txn.amount.abs())
            .sum();

        Ok(consumed as f64 / f64::from(days))
    }

    /// Low-balance predicate with the configured threshold
    pub fn is_low(&self, balance: i64) -> bool {
        is_low_balance(balance, self.credits.low_balance_threshold)
    }

    fn matches(txn: &Transaction, filter: &HistoryFilter) -> bool {
        if let Some(kind) = filter.kind {
            if txn.kind != kind {
                return false;
            }
        }
        if let Some(start) = filter.start {
            if txn.created_at < start {
                return false;
            }
        }
        if let Some(end) = filter.end {
            if txn.created_at > end {
                return false;
            }
        }
        true
    }
}

/// Pure low-balance predicate
pub fn is_low_balance(balance: i64, threshold: i64) -> bool {
    balance < threshold
}
