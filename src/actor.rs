//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! one logical writer task owns the read-check-write-append sequence, so
//! two concurrent deductions against the same user can never both observe
//! the same stale balance and double-spend below zero.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │            Callers (request handlers, admin)          │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               WriterHandle (Clone)                    │
//! │         Sends messages to writer mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              WriterActor (Single Task)                │
//! │   load balance → check sufficiency → WriteBatch       │
//! │        (atomic commit of balance + transaction)       │
//! └──────────────────────────────────────────────────────┘
//! ```

use crate::types::{Balance, Receipt, Transaction, TransactionKind, UserId};
use crate::{Error, Result, Storage};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Message sent to the writer actor
pub enum WriterMessage {
    /// Apply one validated ledger operation
    Apply {
        /// Target user
        user_id: UserId,
        /// Signed amount
        amount: i64,
        /// Event kind
        kind: TransactionKind,
        /// Reason
        description: String,
        /// Reply channel
        response: oneshot::Sender<Result<Receipt>>,
    },

    /// Create a balance row with the registration grant
    CreateAccount {
        /// New user
        user_id: UserId,
        /// Initial grant (logged as a bonus transaction when non-zero)
        initial_grant: i64,
        /// Reply channel
        response: oneshot::Sender<Result<Receipt>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that serializes all ledger writes
pub struct WriterActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<WriterMessage>,
}

impl WriterActor {
    /// Create new actor
    pub fn new(storage: Arc<Storage>, mailbox: mpsc::Receiver<WriterMessage>) -> Self {
        Self { storage, mailbox }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                WriterMessage::Shutdown => break,
                _ => self.handle_message(msg),
            }
        }
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: WriterMessage) {
        match msg {
            WriterMessage::Apply {
                user_id,
                amount,
                kind,
                description,
                response,
            } => {
                let result = self.apply(user_id, amount, kind, description);
                let _ = response.send(result);
            }

            WriterMessage::CreateAccount {
                user_id,
                initial_grant,
                response,
            } => {
                let result = self.create_account(user_id, initial_grant);
                let _ = response.send(result);
            }

            WriterMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    /// Read-check-write-append, all on this single task
    fn apply(
        &self,
        user_id: UserId,
        amount: i64,
        kind: TransactionKind,
        description: String,
    ) -> Result<Receipt> {
        let current = self.storage.get_balance(&user_id)?;

        if amount < 0 && current.would_overdraw(amount) {
            let required = -amount;
            return Err(Error::InsufficientCredits {
                balance: current.balance,
                required,
                deficit: required - current.balance,
            });
        }

        // A backwards wall-clock step must not reorder a user's history:
        // clamp against the stored row's stamp
        let now = Utc::now().max(current.updated_at);
        let updated = current.applied(amount, now);
        let txn = Transaction {
            id: Uuid::now_v7(),
            user_id,
            amount,
            kind,
            description,
            created_at: now,
        };

        self.storage.commit_apply(&updated, &txn)?;

        Ok(Receipt {
            transaction_id: txn.id,
            new_balance: updated.balance,
        })
    }

    /// Create the balance row and log the registration grant
    fn create_account(&self, user_id: UserId, initial_grant: i64) -> Result<Receipt> {
        if self.storage.balance_exists(&user_id)? {
            return Err(Error::AccountExists(user_id.to_string()));
        }

        let now = Utc::now();
        let empty = Balance::new(user_id.clone(), 0, now);

        if initial_grant > 0 {
            let balance = empty.applied(initial_grant, now);
            let txn = Transaction {
                id: Uuid::now_v7(),
                user_id,
                amount: initial_grant,
                kind: TransactionKind::Bonus,
                description: "registration bonus".to_string(),
                created_at: now,
            };
            self.storage.commit_apply(&balance, &txn)?;

            Ok(Receipt {
                transaction_id: txn.id,
                new_balance: balance.balance,
            })
        } else {
            // Zero-grant deployments get a bare balance row and no
            // transaction (amounts are never zero in the log).
            self.storage.put_balance(&empty)?;

            Ok(Receipt {
                transaction_id: Uuid::nil(),
                new_balance: 0,
            })
        }
    }
}

/// Handle for sending messages to the writer actor
#[derive(Clone)]
pub struct WriterHandle {
    sender: mpsc::Sender<WriterMessage>,
}

impl WriterHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<WriterMessage>) -> Self {
        Self { sender }
    }

    /// Apply one validated ledger operation
    pub async fn apply(
        &self,
        user_id: UserId,
        amount: i64,
        kind: TransactionKind,
        description: String,
    ) -> Result<Receipt> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(WriterMessage::Apply {
                user_id,
                amount,
                kind,
                description,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Writer mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Create a balance row with the registration grant
    pub async fn create_account(&self, user_id: UserId, initial_grant: i64) -> Result<Receipt> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(WriterMessage::CreateAccount {
                user_id,
                initial_grant,
                response: tx,
            })
            .await
            .map_err(|_| Error::Concurrency("Writer mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(WriterMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Writer mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the writer actor
pub fn spawn_writer_actor(storage: Arc<Storage>) -> WriterHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = WriterActor::new(storage, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    WriterHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;

    fn test_storage() -> (Arc<Storage>, tempfile::TempDir) {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (Arc::new(Storage::open(&config).unwrap()), temp_dir)
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let (storage, _temp) = test_storage();
        let handle = spawn_writer_actor(storage);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_create_and_apply() {
        let (storage, _temp) = test_storage();
        let handle = spawn_writer_actor(storage.clone());
        let user = UserId::new("u1");

        let receipt = handle.create_account(user.clone(), 100).await.unwrap();
        assert_eq!(receipt.new_balance, 100);

        let receipt = handle
            .apply(
                user.clone(),
                -30,
                TransactionKind::Deduction,
                "image generation".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(receipt.new_balance, 70);

        let balance = storage.get_balance(&user).unwrap();
        assert_eq!(balance.balance, 70);
        assert_eq!(balance.version, 2);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_rejects_overdraw_without_mutation() {
        let (storage, _temp) = test_storage();
        let handle = spawn_writer_actor(storage.clone());
        let user = UserId::new("u1");

        handle.create_account(user.clone(), 10).await.unwrap();

        let result = handle
            .apply(
                user.clone(),
                -25,
                TransactionKind::Deduction,
                "too big".to_string(),
            )
            .await;

        match result {
            Err(Error::InsufficientCredits {
                balance,
                required,
                deficit,
            }) => {
                assert_eq!(balance, 10);
                assert_eq!(required, 25);
                assert_eq!(deficit, 15);
            }
            other => panic!("expected InsufficientCredits, got {:?}", other.map(|_| ())),
        }

        // Nothing mutated: balance unchanged, only the registration txn logged
        let balance = storage.get_balance(&user).unwrap();
        assert_eq!(balance.balance, 10);
        let txns = storage.user_transactions(&user).unwrap();
        assert_eq!(txns.len(), 1);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_stamps_never_go_backwards() {
        let (storage, _temp) = test_storage();
        let handle = spawn_writer_actor(storage.clone());
        let user = UserId::new("u1");

        handle.create_account(user.clone(), 100).await.unwrap();

        // Simulate a clock step backwards: the stored row is ahead of now
        let mut ahead = storage.get_balance(&user).unwrap();
        ahead.updated_at = Utc::now() + chrono::Duration::hours(1);
        storage.put_balance(&ahead).unwrap();
        let future = ahead.updated_at;

        handle
            .apply(
                user.clone(),
                -10,
                TransactionKind::Deduction,
                "text generation".to_string(),
            )
            .await
            .unwrap();

        let balance = storage.get_balance(&user).unwrap();
        assert!(balance.updated_at >= future);
        let txns = storage.user_transactions(&user).unwrap();
        assert!(txns.last().unwrap().created_at >= future);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_duplicate_account_rejected() {
        let (storage, _temp) = test_storage();
        let handle = spawn_writer_actor(storage);
        let user = UserId::new("u1");

        handle.create_account(user.clone(), 100).await.unwrap();
        let result = handle.create_account(user, 100).await;
        assert!(matches!(result, Err(Error::AccountExists(_))));

        handle.shutdown().await.unwrap();
    }
}
