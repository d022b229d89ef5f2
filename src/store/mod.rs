//! Store module
//!
//! Persistence seams for users, accounts and transactions, with a Postgres
//! implementation and an in-memory one.

mod error;
mod memory;
mod postgres;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::domain::{
    Account, AccountNumber, AccountStatus, NewAccount, Transaction, User, UserId,
};

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Lookup of the users that own accounts
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, user_id: UserId) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new account; `UniqueViolation` if the number is taken.
    async fn insert_account(&self, account: NewAccount) -> StoreResult<Account>;

    async fn find_account_by_number(&self, number: &AccountNumber) -> StoreResult<Option<Account>>;

    async fn account_number_exists(&self, number: &AccountNumber) -> StoreResult<bool>;

    /// Persist status and balance of `account`, fenced on `account.version`.
    /// Returns the account as stored (version bumped).
    async fn update_account(&self, account: &Account) -> StoreResult<Account>;

    /// Accounts in insertion order
    async fn list_accounts_by_owner_and_status(
        &self,
        user_id: UserId,
        status: AccountStatus,
    ) -> StoreResult<Vec<Account>>;

    async fn count_accounts_by_owner_and_status(
        &self,
        user_id: UserId,
        status: AccountStatus,
    ) -> StoreResult<u64>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()>;

    async fn find_transaction(&self, transaction_id: &str) -> StoreResult<Option<Transaction>>;
}

/// A balance mutation and its transaction record, committed together.
#[derive(Debug, Clone)]
pub struct BalanceChange {
    /// The account with its new balance; `version` is the version it was read at
    pub account: Account,
    /// The SUCCESS record; for a CANCEL, `reverses` names the USE to mark canceled
    pub transaction: Transaction,
}

/// All stores plus the all-or-nothing balance commit
#[async_trait]
pub trait LedgerStore: UserStore + AccountStore + TransactionStore {
    /// Update the balance, mark the reversed USE (if any) canceled and insert
    /// the transaction record, atomically. Nothing is written on error.
    async fn commit_balance_change(&self, change: &BalanceChange) -> StoreResult<Account>;
}
