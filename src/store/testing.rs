//! Store wrapper for tests
//!
//! Delegates to an [`InMemoryStore`] and can hold a balance commit mid-flight
//! or reject transaction inserts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::domain::{Account, AccountNumber, AccountStatus, NewAccount, Transaction, User, UserId};

use super::{
    AccountStore, BalanceChange, InMemoryStore, LedgerStore, StoreError, StoreResult,
    TransactionStore, UserStore,
};

pub(crate) struct InstrumentedStore {
    inner: Arc<InMemoryStore>,
    hold_next_commit: AtomicBool,
    reject_inserts: AtomicBool,
    /// Signalled when a held commit is waiting
    pub(crate) commit_held: Notify,
    /// Lets a held commit proceed
    pub(crate) resume_commit: Notify,
}

impl InstrumentedStore {
    pub(crate) fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            hold_next_commit: AtomicBool::new(false),
            reject_inserts: AtomicBool::new(false),
            commit_held: Notify::new(),
            resume_commit: Notify::new(),
        }
    }

    /// Park the next `commit_balance_change` until `resume_commit` fires
    pub(crate) fn hold_next_commit(&self) {
        self.hold_next_commit.store(true, Ordering::SeqCst);
    }

    /// Fail every `insert_transaction` with a corrupt-row error
    pub(crate) fn reject_inserts(&self) {
        self.reject_inserts.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserStore for InstrumentedStore {
    async fn find_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        self.inner.find_user(user_id).await
    }
}

#[async_trait]
impl AccountStore for InstrumentedStore {
    async fn insert_account(&self, account: NewAccount) -> StoreResult<Account> {
        self.inner.insert_account(account).await
    }

    async fn find_account_by_number(&self, number: &AccountNumber) -> StoreResult<Option<Account>> {
        self.inner.find_account_by_number(number).await
    }

    async fn account_number_exists(&self, number: &AccountNumber) -> StoreResult<bool> {
        self.inner.account_number_exists(number).await
    }

    async fn update_account(&self, account: &Account) -> StoreResult<Account> {
        self.inner.update_account(account).await
    }

    async fn list_accounts_by_owner_and_status(
        &self,
        user_id: UserId,
        status: AccountStatus,
    ) -> StoreResult<Vec<Account>> {
        self.inner.list_accounts_by_owner_and_status(user_id, status).await
    }

    async fn count_accounts_by_owner_and_status(
        &self,
        user_id: UserId,
        status: AccountStatus,
    ) -> StoreResult<u64> {
        self.inner.count_accounts_by_owner_and_status(user_id, status).await
    }
}

#[async_trait]
impl TransactionStore for InstrumentedStore {
    async fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        if self.reject_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("transactions table unavailable".to_string()));
        }
        self.inner.insert_transaction(transaction).await
    }

    async fn find_transaction(&self, transaction_id: &str) -> StoreResult<Option<Transaction>> {
        self.inner.find_transaction(transaction_id).await
    }
}

#[async_trait]
impl LedgerStore for InstrumentedStore {
    async fn commit_balance_change(&self, change: &BalanceChange) -> StoreResult<Account> {
        if self.hold_next_commit.swap(false, Ordering::SeqCst) {
            self.commit_held.notify_one();
            self.resume_commit.notified().await;
        }
        self.inner.commit_balance_change(change).await
    }
}
