//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `balances` - Materialized balance per user (key: user_id)
//! - `transactions` - Append-only transaction log (key: transaction id)
//! - `indices` - Per-user history index (key: user_id || 0x00 || version || txn_id)
//! - `admin_ops` - Append-only admin audit trail (key: record id)
//!
//! The history index key embeds the balance row's post-apply `version`
//! (big-endian u64), so a forward prefix scan yields a user's transactions
//! in commit order regardless of wall-clock ties.

use crate::{
    error::{Error, Result},
    types::{AdminOperationRecord, Balance, Transaction, UserId},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_BALANCES: &str = "balances";
const CF_TRANSACTIONS: &str = "transactions";
const CF_INDICES: &str = "indices";
const CF_ADMIN_OPS: &str = "admin_ops";

/// Separator between user id and version in index keys. User ids must not
/// contain NUL; the ledger validates this at account creation.
const INDEX_SEP: u8 = 0x00;

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Universal compaction for the append-heavy transaction log
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BALANCES, Self::cf_options_balances()),
            ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Self::cf_options_transactions()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
            ColumnFamilyDescriptor::new(CF_ADMIN_OPS, Self::cf_options_admin_ops()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB for credit ledger");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_balances() -> Options {
        let mut opts = Options::default();
        // Balances are read on every apply, favor speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_transactions() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_options_admin_ops() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Balance operations

    /// Get balance row for a user
    pub fn get_balance(&self, user_id: &UserId) -> Result<Balance> {
        let cf = self.cf_handle(CF_BALANCES)?;

        let value = self
            .db
            .get_cf(cf, user_id.as_bytes())?
            .ok_or_else(|| Error::UserNotFound(user_id.to_string()))?;

        let balance: Balance = bincode::deserialize(&value)?;
        Ok(balance)
    }

    /// Whether a balance row exists for a user
    pub fn balance_exists(&self, user_id: &UserId) -> Result<bool> {
        let cf = self.cf_handle(CF_BALANCES)?;
        Ok(self.db.get_cf(cf, user_id.as_bytes())?.is_some())
    }

    /// Write a balance row directly, bypassing the transaction log.
    ///
    /// Only the writer task and reconciliation tests should call this;
    /// normal mutations go through [`Storage::commit_apply`].
    pub fn put_balance(&self, balance: &Balance) -> Result<()> {
        let cf = self.cf_handle(CF_BALANCES)?;
        let value = bincode::serialize(balance)?;
        self.db.put_cf(cf, balance.user_id.as_bytes(), &value)?;
        Ok(())
    }

    // Ledger commit

    /// Commit one ledger operation: updated balance row, transaction row,
    /// and history index entry, in a single atomic WriteBatch.
    pub fn commit_apply(&self, balance: &Balance, txn: &Transaction) -> Result<()> {
        let mut batch = WriteBatch::default();

        // 1. Balance row
        let cf_balances = self.cf_handle(CF_BALANCES)?;
        let balance_value = bincode::serialize(balance)?;
        batch.put_cf(cf_balances, balance.user_id.as_bytes(), &balance_value);

        // 2. Transaction row
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;
        let txn_value = bincode::serialize(txn)?;
        batch.put_cf(cf_transactions, txn.id.as_bytes(), &txn_value);

        // 3. History index: user_id || 0x00 || version || txn_id -> empty
        let cf_indices = self.cf_handle(CF_INDICES)?;
        let idx_key = Self::index_key(&txn.user_id, balance.version, txn.id);
        batch.put_cf(cf_indices, &idx_key, &[]);

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(
            transaction_id = %txn.id,
            user_id = %txn.user_id,
            amount = txn.amount,
            kind = %txn.kind,
            new_balance = balance.balance,
            "Ledger operation committed"
        );

        Ok(())
    }

    // Transaction operations

    /// Get transaction by ID
    pub fn get_transaction(&self, txn_id: Uuid) -> Result<Transaction> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;

        let value = self
            .db
            .get_cf(cf, txn_id.as_bytes())?
            .ok_or_else(|| Error::Storage(format!("Transaction not found: {}", txn_id)))?;

        let txn: Transaction = bincode::deserialize(&value)?;
        Ok(txn)
    }

    /// Get all transactions for a user, in commit order (oldest first)
    pub fn user_transactions(&self, user_id: &UserId) -> Result<Vec<Transaction>> {
        let cf_indices = self.cf_handle(CF_INDICES)?;

        let prefix = Self::index_prefix(user_id);
        let iter = self
            .db
            .iterator_cf(cf_indices, IteratorMode::From(&prefix, Direction::Forward));

        let mut transactions = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }

            // Key layout: prefix (user_id + sep) || version (8) || txn_id (16)
            if key.len() == prefix.len() + 8 + 16 {
                let txn_id_bytes: [u8; 16] = key[prefix.len() + 8..]
                    .try_into()
                    .map_err(|_| Error::Storage("Malformed index key".to_string()))?;
                let txn_id = Uuid::from_bytes(txn_id_bytes);

                transactions.push(self.get_transaction(txn_id)?);
            }
        }

        Ok(transactions)
    }

    // Balance scans (reconciliation)

    /// All balance rows, for batch audits
    pub fn all_balances(&self) -> Result<Vec<Balance>> {
        let cf = self.cf_handle(CF_BALANCES)?;

        let mut balances = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            let balance: Balance = bincode::deserialize(&value)?;
            balances.push(balance);
        }

        Ok(balances)
    }

    // Admin audit trail

    /// Append an admin operation record
    pub fn append_admin_record(&self, record: &AdminOperationRecord) -> Result<()> {
        let cf = self.cf_handle(CF_ADMIN_OPS)?;
        let value = bincode::serialize(record)?;
        self.db.put_cf(cf, record.id.as_bytes(), &value)?;

        tracing::debug!(
            record_id = %record.id,
            admin_id = %record.admin_id,
            operation = %record.operation,
            "Admin operation recorded"
        );

        Ok(())
    }

    /// Admin records targeting a user, oldest first. Audit-trail volume is
    /// small, so a filtered scan is acceptable.
    pub fn admin_records_for_user(&self, user_id: &UserId) -> Result<Vec<AdminOperationRecord>> {
        let cf = self.cf_handle(CF_ADMIN_OPS)?;

        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            let record: AdminOperationRecord = bincode::deserialize(&value)?;
            if record.target_user.as_ref() == Some(user_id) {
                records.push(record);
            }
        }

        Ok(records)
    }

    /// Overwrite a transaction row with raw bytes, making it
    /// undeserializable. Fault-injection hook for audit tests.
    #[cfg(test)]
    pub(crate) fn corrupt_transaction(&self, txn_id: Uuid, bytes: &[u8]) -> Result<()> {
        let cf = self.cf_handle(CF_TRANSACTIONS)?;
        self.db.put_cf(cf, txn_id.as_bytes(), bytes)?;
        Ok(())
    }

    // Index key helpers

    fn index_prefix(user_id: &UserId) -> Vec<u8> {
        let mut prefix = user_id.as_bytes().to_vec();
        prefix.push(INDEX_SEP);
        prefix
    }

    fn index_key(user_id: &UserId, version: u64, txn_id: Uuid) -> Vec<u8> {
        let mut key = Self::index_prefix(user_id);
        key.extend_from_slice(&version.to_be_bytes());
        key.extend_from_slice(txn_id.as_bytes());
        key
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        let cf_transactions = self.cf_handle(CF_TRANSACTIONS)?;

        let transaction_count = self.approximate_count(cf_transactions)?;

        let mut balance_count = 0u64;
        let cf_balances = self.cf_handle(CF_BALANCES)?;
        for _ in self.db.iterator_cf(cf_balances, IteratorMode::Start) {
            balance_count += 1;
        }

        Ok(StorageStats {
            total_users: balance_count,
            total_transactions: transaction_count,
        })
    }

    fn approximate_count(&self, cf: &ColumnFamily) -> Result<u64> {
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Balance rows
    pub total_users: u64,
    /// Transaction rows (approximate)
    pub total_transactions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionKind;
    use chrono::Utc;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn test_transaction(user_id: &UserId, amount: i64, kind: TransactionKind) -> Transaction {
        Transaction {
            id: Uuid::now_v7(),
            user_id: user_id.clone(),
            amount,
            kind,
            description: "test".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_get_balance_missing_user() {
        let (storage, _temp) = test_storage();
        let result = storage.get_balance(&UserId::new("nobody"));
        assert!(matches!(result, Err(Error::UserNotFound(_))));
    }

    #[test]
    fn test_commit_apply_roundtrip() {
        let (storage, _temp) = test_storage();
        let user = UserId::new("u1");

        let balance = Balance::new(user.clone(), 0, Utc::now()).applied(100, Utc::now());
        let txn = test_transaction(&user, 100, TransactionKind::Bonus);
        storage.commit_apply(&balance, &txn).unwrap();

        let stored = storage.get_balance(&user).unwrap();
        assert_eq!(stored.balance, 100);
        assert_eq!(stored.version, 1);

        let txns = storage.user_transactions(&user).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].id, txn.id);
    }

    #[test]
    fn test_user_transactions_commit_order() {
        let (storage, _temp) = test_storage();
        let user = UserId::new("u1");

        let mut balance = Balance::new(user.clone(), 0, Utc::now());
        let mut expected_ids = Vec::new();
        for amount in [100i64, -10, -20, 5] {
            balance = balance.applied(amount, Utc::now());
            let kind = if amount < 0 {
                TransactionKind::Deduction
            } else {
                TransactionKind::Bonus
            };
            let txn = test_transaction(&user, amount, kind);
            expected_ids.push(txn.id);
            storage.commit_apply(&balance, &txn).unwrap();
        }

        let txns = storage.user_transactions(&user).unwrap();
        let ids: Vec<Uuid> = txns.iter().map(|t| t.id).collect();
        assert_eq!(ids, expected_ids);
    }

    #[test]
    fn test_user_transactions_isolated_between_users() {
        let (storage, _temp) = test_storage();
        let alice = UserId::new("alice");
        let bob = UserId::new("bob");

        let a_balance = Balance::new(alice.clone(), 0, Utc::now()).applied(50, Utc::now());
        storage
            .commit_apply(&a_balance, &test_transaction(&alice, 50, TransactionKind::Bonus))
            .unwrap();

        let b_balance = Balance::new(bob.clone(), 0, Utc::now()).applied(70, Utc::now());
        storage
            .commit_apply(&b_balance, &test_transaction(&bob, 70, TransactionKind::Recharge))
            .unwrap();

        let a_txns = storage.user_transactions(&alice).unwrap();
        assert_eq!(a_txns.len(), 1);
        assert_eq!(a_txns[0].amount, 50);

        let b_txns = storage.user_transactions(&bob).unwrap();
        assert_eq!(b_txns.len(), 1);
        assert_eq!(b_txns[0].amount, 70);
    }

    #[test]
    fn test_all_balances() {
        let (storage, _temp) = test_storage();

        for (name, amount) in [("u1", 10i64), ("u2", 20), ("u3", 30)] {
            let user = UserId::new(name);
            let balance = Balance::new(user.clone(), 0, Utc::now()).applied(amount, Utc::now());
            storage
                .commit_apply(&balance, &test_transaction(&user, amount, TransactionKind::Bonus))
                .unwrap();
        }

        let balances = storage.all_balances().unwrap();
        assert_eq!(balances.len(), 3);
        let total: i64 = balances.iter().map(|b| b.balance).sum();
        assert_eq!(total, 60);
    }

    #[test]
    fn test_admin_records_for_user() {
        let (storage, _temp) = test_storage();
        let user = UserId::new("u1");

        let record = AdminOperationRecord {
            id: Uuid::now_v7(),
            admin_id: "admin-1".to_string(),
            operation: crate::types::AdminOperation::AdjustCredits,
            target_user: Some(user.clone()),
            credit_amount: Some(50),
            before_balance: Some(100),
            after_balance: Some(150),
            description: "[admin:admin-1] bonus grant".to_string(),
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: None,
            created_at: Utc::now(),
        };
        storage.append_admin_record(&record).unwrap();

        let records = storage.admin_records_for_user(&user).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].admin_id, "admin-1");

        let none = storage
            .admin_records_for_user(&UserId::new("other"))
            .unwrap();
        assert!(none.is_empty());
    }
}
