//! Account Handler
//!
//! Opens, closes and lists accounts.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{Account, AccountNumber, AccountStatus, Balance, DomainError, NewAccount, User, UserId};
use crate::error::{AppError, AppResult};
use crate::lock::{guarded, LockManager, LockTarget};
use crate::store::{LedgerStore, StoreError};

use super::{
    fenced_write_error, find_account, find_user, AccountNumberGenerator, AccountSummary,
    CloseAccountCommand, CloseAccountResult, CreateAccountCommand, CreateAccountResult,
    LedgerSettings,
};

/// Account lifecycle service
pub struct AccountService {
    store: Arc<dyn LedgerStore>,
    locks: Arc<dyn LockManager>,
    numbers: Arc<dyn AccountNumberGenerator>,
    settings: LedgerSettings,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        locks: Arc<dyn LockManager>,
        numbers: Arc<dyn AccountNumberGenerator>,
        settings: LedgerSettings,
    ) -> Self {
        Self {
            store,
            locks,
            numbers,
            settings,
        }
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Open an account. Creation is serialized on a single global lock so the
    /// per-user ceiling and number uniqueness are checked without races.
    pub async fn create_account(&self, command: CreateAccountCommand) -> AppResult<CreateAccountResult> {
        let user = find_user(self.store.as_ref(), command.user_id).await?;
        let user = &user;

        let account = guarded(
            &self.locks,
            &LockTarget::CreateAccount,
            self.settings.lock,
            move || self.create_locked(user, command.initial_balance),
        )
        .await?;

        tracing::info!(
            user_id = account.user_id,
            account_number = %account.account_number,
            balance = account.balance.value(),
            "Account created"
        );

        Ok(CreateAccountResult {
            user_id: account.user_id,
            account_number: account.account_number,
            registered_at: account.registered_at,
        })
    }

    async fn create_locked(&self, user: &User, initial_balance: Balance) -> AppResult<Account> {
        let in_use = self
            .store
            .count_accounts_by_owner_and_status(user.id, AccountStatus::InUse)
            .await?;

        if in_use >= u64::from(self.settings.max_accounts_per_user) {
            return Err(DomainError::MaxAccountsPerUser {
                user_id: user.id,
                limit: self.settings.max_accounts_per_user,
            }
            .into());
        }

        let number = self.unused_account_number().await?;

        self.store
            .insert_account(NewAccount::new(user.id, number, initial_balance))
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(detail) => {
                    tracing::warn!(detail = %detail, "Account number taken at insert");
                    AppError::Domain(DomainError::AccountNumberAlreadyExists)
                }
                other => other.into(),
            })
    }

    /// Draw candidates until one is not in the store
    async fn unused_account_number(&self) -> AppResult<AccountNumber> {
        let attempts = self.settings.account_number_attempts;

        for attempt in 1..=attempts {
            let candidate = self.numbers.next_number();
            if !self.store.account_number_exists(&candidate).await? {
                return Ok(candidate);
            }
            tracing::debug!(attempt, account_number = %candidate, "Account number collision");
        }

        tracing::error!(attempts, "No unused account number found");
        Err(DomainError::AccountNumberAlreadyExists.into())
    }

    // =========================================================================
    // Close
    // =========================================================================

    /// Unregister an account. Runs under the account's modify lock so it
    /// cannot interleave with a use or cancel.
    pub async fn close_account(&self, command: CloseAccountCommand) -> AppResult<CloseAccountResult> {
        let user = find_user(self.store.as_ref(), command.user_id).await?;
        let number = &command.account_number;

        let account = guarded(
            &self.locks,
            &command.lock_target(),
            self.settings.lock,
            move || self.close_locked(user.id, number),
        )
        .await?;

        tracing::info!(
            user_id = account.user_id,
            account_number = %account.account_number,
            "Account unregistered"
        );

        let unregistered_at = account.unregistered_at.ok_or_else(|| {
            AppError::Internal(format!(
                "account {} stored without unregistered_at",
                account.account_number
            ))
        })?;

        Ok(CloseAccountResult {
            user_id: account.user_id,
            account_number: account.account_number,
            unregistered_at,
        })
    }

    async fn close_locked(&self, user_id: UserId, number: &AccountNumber) -> AppResult<Account> {
        let mut account = find_account(self.store.as_ref(), number).await?;

        if !account.is_owned_by(user_id) {
            return Err(DomainError::OwnerMismatch {
                user_id,
                account_number: number.to_string(),
            }
            .into());
        }
        if !account.is_in_use() {
            return Err(DomainError::AlreadyUnregistered(number.to_string()).into());
        }
        if !account.balance.is_zero() {
            return Err(DomainError::BalanceNotEmpty {
                balance: account.balance.value(),
            }
            .into());
        }

        account.unregister(Utc::now());

        self.store
            .update_account(&account)
            .await
            .map_err(|e| fenced_write_error(e, number))
    }

    // =========================================================================
    // List
    // =========================================================================

    /// A user's IN_USE accounts in creation order
    pub async fn list_accounts(&self, user_id: UserId) -> AppResult<Vec<AccountSummary>> {
        find_user(self.store.as_ref(), user_id).await?;

        let accounts = self
            .store
            .list_accounts_by_owner_and_status(user_id, AccountStatus::InUse)
            .await?;

        Ok(accounts.iter().map(AccountSummary::from).collect())
    }
}
