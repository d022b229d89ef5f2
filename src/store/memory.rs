//! In-memory store
//!
//! Mutex-guarded maps with the same semantics as the Postgres store. Used by
//! tests and by the server when no database is configured.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::{
    Account, AccountNumber, AccountStatus, NewAccount, Transaction, User, UserId,
};

use super::{
    AccountStore, BalanceChange, LedgerStore, StoreError, StoreResult, TransactionStore,
    UserStore,
};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<UserId, User>,
    /// Indexed by `id - 1`
    accounts: Vec<Account>,
    account_index: HashMap<AccountNumber, usize>,
    transactions: Vec<Transaction>,
    transaction_index: HashMap<String, usize>,
}

impl MemoryState {
    fn account_slot(&mut self, account: &Account) -> StoreResult<&mut Account> {
        let slot = self
            .accounts
            .get_mut((account.id - 1) as usize)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown account id {}", account.id)))?;

        if slot.version != account.version {
            return Err(StoreError::VersionConflict {
                account_id: account.id,
                expected: account.version,
            });
        }
        Ok(slot)
    }

    fn push_transaction(&mut self, transaction: &Transaction) -> StoreResult<()> {
        if self.transaction_index.contains_key(&transaction.transaction_id) {
            return Err(StoreError::UniqueViolation(format!(
                "transaction_id {}",
                transaction.transaction_id
            )));
        }
        self.transaction_index
            .insert(transaction.transaction_id.clone(), self.transactions.len());
        self.transactions.push(transaction.clone());
        Ok(())
    }
}

/// Store backed by process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with users
    pub fn with_users<I>(users: I) -> Self
    where
        I: IntoIterator<Item = User>,
    {
        let store = Self::new();
        for user in users {
            store.add_user(user);
        }
        store
    }

    pub fn add_user(&self, user: User) {
        self.state().users.insert(user.id, user);
    }

    /// All transactions recorded against an account, oldest first
    pub fn transactions_for(&self, number: &AccountNumber) -> Vec<Transaction> {
        self.state()
            .transactions
            .iter()
            .filter(|t| &t.account_number == number)
            .cloned()
            .collect()
    }

    pub fn account_count(&self) -> usize {
        self.state().accounts.len()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        Ok(self.state().users.get(&user_id).cloned())
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn insert_account(&self, account: NewAccount) -> StoreResult<Account> {
        let mut state = self.state();

        if state.account_index.contains_key(&account.account_number) {
            return Err(StoreError::UniqueViolation(format!(
                "account_number {}",
                account.account_number
            )));
        }

        let id = state.accounts.len() as i64 + 1;
        let account = Account::from_new(id, account);
        let slot = state.accounts.len();
        state.account_index.insert(account.account_number.clone(), slot);
        state.accounts.push(account.clone());

        Ok(account)
    }

    async fn find_account_by_number(&self, number: &AccountNumber) -> StoreResult<Option<Account>> {
        let state = self.state();
        Ok(state
            .account_index
            .get(number)
            .and_then(|&slot| state.accounts.get(slot))
            .cloned())
    }

    async fn account_number_exists(&self, number: &AccountNumber) -> StoreResult<bool> {
        Ok(self.state().account_index.contains_key(number))
    }

    async fn update_account(&self, account: &Account) -> StoreResult<Account> {
        let mut state = self.state();
        let slot = state.account_slot(account)?;

        slot.status = account.status;
        slot.balance = account.balance;
        slot.unregistered_at = account.unregistered_at;
        slot.version += 1;

        Ok(slot.clone())
    }

    async fn list_accounts_by_owner_and_status(
        &self,
        user_id: UserId,
        status: AccountStatus,
    ) -> StoreResult<Vec<Account>> {
        Ok(self
            .state()
            .accounts
            .iter()
            .filter(|a| a.user_id == user_id && a.status == status)
            .cloned()
            .collect())
    }

    async fn count_accounts_by_owner_and_status(
        &self,
        user_id: UserId,
        status: AccountStatus,
    ) -> StoreResult<u64> {
        Ok(self
            .state()
            .accounts
            .iter()
            .filter(|a| a.user_id == user_id && a.status == status)
            .count() as u64)
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        self.state().push_transaction(transaction)
    }

    async fn find_transaction(&self, transaction_id: &str) -> StoreResult<Option<Transaction>> {
        let state = self.state();
        Ok(state
            .transaction_index
            .get(transaction_id)
            .and_then(|&slot| state.transactions.get(slot))
            .cloned())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn commit_balance_change(&self, change: &BalanceChange) -> StoreResult<Account> {
        let mut state = self.state();

        // Validate every part before touching anything.
        state.account_slot(&change.account)?;
        if state.transaction_index.contains_key(&change.transaction.transaction_id) {
            return Err(StoreError::UniqueViolation(format!(
                "transaction_id {}",
                change.transaction.transaction_id
            )));
        }
        let reversed_slot = match &change.transaction.reverses {
            Some(original_id) => {
                let slot = *state
                    .transaction_index
                    .get(original_id)
                    .ok_or_else(|| StoreError::Corrupt(format!("unknown transaction {}", original_id)))?;
                if state.transactions[slot].canceled {
                    return Err(StoreError::CancelConflict(original_id.clone()));
                }
                Some(slot)
            }
            None => None,
        };

        let account = state.account_slot(&change.account)?;
        account.balance = change.account.balance;
        account.version += 1;
        let stored = account.clone();

        if let Some(slot) = reversed_slot {
            state.transactions[slot].canceled = true;
        }
        state.push_transaction(&change.transaction)?;

        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, Balance, TransactionType};

    fn number(s: &str) -> AccountNumber {
        s.parse().unwrap()
    }

    fn store() -> InMemoryStore {
        InMemoryStore::with_users([User { id: 1, name: "alice".to_string() }])
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_number() {
        let store = store();
        store
            .insert_account(NewAccount::new(1, number("1000000000"), Balance::zero()))
            .await
            .unwrap();

        let err = store
            .insert_account(NewAccount::new(1, number("1000000000"), Balance::zero()))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::UniqueViolation(_)));
        assert_eq!(store.account_count(), 1);
    }

    #[tokio::test]
    async fn test_update_is_version_fenced() {
        let store = store();
        let account = store
            .insert_account(NewAccount::new(1, number("1000000000"), Balance::new(10).unwrap()))
            .await
            .unwrap();

        let mut first = account.clone();
        first.balance = Balance::new(5).unwrap();
        let stored = store.update_account(&first).await.unwrap();
        assert_eq!(stored.version, account.version + 1);

        // A writer still holding the old version is rejected
        let mut stale = account.clone();
        stale.balance = Balance::zero();
        let err = store.update_account(&stale).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));

        let current = store.find_account_by_number(&number("1000000000")).await.unwrap().unwrap();
        assert_eq!(current.balance.value(), 5);
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = store();
        let account = store
            .insert_account(NewAccount::new(1, number("1000000000"), Balance::new(100).unwrap()))
            .await
            .unwrap();

        let amount = Amount::new(40).unwrap();
        let mut debited = account.clone();
        debited.withdraw(&amount).unwrap();
        let use_txn = Transaction::use_success(account.id, account.account_number.clone(), &amount, debited.balance);
        let stored = store
            .commit_balance_change(&BalanceChange { account: debited, transaction: use_txn.clone() })
            .await
            .unwrap();
        assert_eq!(stored.balance.value(), 60);

        // Cancel once
        let mut credited = stored.clone();
        credited.deposit(&amount).unwrap();
        let cancel = Transaction::cancel_success(&use_txn, &amount, credited.balance);
        let stored = store
            .commit_balance_change(&BalanceChange { account: credited, transaction: cancel })
            .await
            .unwrap();
        assert_eq!(stored.balance.value(), 100);
        assert!(store.find_transaction(&use_txn.transaction_id).await.unwrap().unwrap().canceled);

        // A second cancel of the same USE commits nothing
        let mut credited = stored.clone();
        credited.deposit(&amount).unwrap();
        let again = Transaction::cancel_success(&use_txn, &amount, credited.balance);
        let err = store
            .commit_balance_change(&BalanceChange { account: credited, transaction: again.clone() })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CancelConflict(_)));

        let current = store.find_account_by_number(&account.account_number).await.unwrap().unwrap();
        assert_eq!(current.balance.value(), 100);
        assert!(store.find_transaction(&again.transaction_id).await.unwrap().is_none());
        assert_eq!(store.transactions_for(&account.account_number).len(), 2);
    }

    #[tokio::test]
    async fn test_list_and_count_by_owner_and_status() {
        let store = store();
        for n in ["1000000000", "1000000001", "1000000002"] {
            store
                .insert_account(NewAccount::new(1, number(n), Balance::zero()))
                .await
                .unwrap();
        }
        let mut closed = store.find_account_by_number(&number("1000000001")).await.unwrap().unwrap();
        closed.unregister(chrono::Utc::now());
        store.update_account(&closed).await.unwrap();

        let listed = store
            .list_accounts_by_owner_and_status(1, AccountStatus::InUse)
            .await
            .unwrap();
        let numbers: Vec<&str> = listed.iter().map(|a| a.account_number.as_str()).collect();
        assert_eq!(numbers, vec!["1000000000", "1000000002"]);
        assert_eq!(
            store.count_accounts_by_owner_and_status(1, AccountStatus::Unregistered).await.unwrap(),
            1
        );
        assert_eq!(
            store.count_accounts_by_owner_and_status(2, AccountStatus::InUse).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_failure_records_are_plain_inserts() {
        let store = store();
        let account = store
            .insert_account(NewAccount::new(1, number("1000000000"), Balance::new(5).unwrap()))
            .await
            .unwrap();

        let failed = Transaction::failure(
            TransactionType::Use,
            account.id,
            account.account_number.clone(),
            50,
            account.balance,
            crate::domain::ErrorCode::AmountExceedsBalance,
        );
        store.insert_transaction(&failed).await.unwrap();

        let found = store.find_transaction(&failed.transaction_id).await.unwrap().unwrap();
        assert_eq!(found, failed);
    }
}
