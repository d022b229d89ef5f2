//! Transaction Handler
//!
//! Use (debit) and cancel (full reversal) of account balances, plus the
//! failure records and read-side lookup.

use std::sync::Arc;

use crate::domain::{
    AccountNumber, DomainError, ErrorCode, Transaction, TransactionType,
};
use crate::error::{AppError, AppResult};
use crate::lock::{guarded, LockManager, LockSettings};
use crate::store::{BalanceChange, LedgerStore};

use super::{
    fenced_write_error, find_account, find_user, CancelBalanceCommand, TransactionDetail,
    TransactionReceipt, UseBalanceCommand,
};

/// Balance transaction service
pub struct TransactionService {
    store: Arc<dyn LedgerStore>,
    locks: Arc<dyn LockManager>,
    lock_settings: LockSettings,
}

impl TransactionService {
    pub fn new(store: Arc<dyn LedgerStore>, locks: Arc<dyn LockManager>, lock_settings: LockSettings) -> Self {
        Self {
            store,
            locks,
            lock_settings,
        }
    }

    // =========================================================================
    // Use
    // =========================================================================

    /// Debit an account under its modify lock
    pub async fn use_balance(&self, command: UseBalanceCommand) -> AppResult<TransactionReceipt> {
        let cmd = &command;
        let transaction = guarded(
            &self.locks,
            &command.lock_target(),
            self.lock_settings,
            move || self.use_locked(cmd),
        )
        .await?;

        tracing::info!(
            transaction_id = %transaction.transaction_id,
            account_number = %transaction.account_number,
            amount = transaction.amount,
            balance = transaction.balance_snapshot,
            "Balance used"
        );

        Ok(TransactionReceipt::from(&transaction))
    }

    async fn use_locked(&self, cmd: &UseBalanceCommand) -> AppResult<Transaction> {
        let user = find_user(self.store.as_ref(), cmd.user_id).await?;
        let mut account = find_account(self.store.as_ref(), &cmd.account_number).await?;

        if !account.is_owned_by(user.id) {
            return Err(DomainError::OwnerMismatch {
                user_id: user.id,
                account_number: cmd.account_number.to_string(),
            }
            .into());
        }
        if !account.is_in_use() {
            return Err(DomainError::AlreadyUnregistered(cmd.account_number.to_string()).into());
        }
        if !account.balance.is_sufficient_for(&cmd.amount) {
            return Err(DomainError::amount_exceeds_balance(
                cmd.amount.value(),
                account.balance.value(),
            )
            .into());
        }

        let balance_after = account
            .withdraw(&cmd.amount)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let transaction = Transaction::use_success(
            account.id,
            account.account_number.clone(),
            &cmd.amount,
            balance_after,
        );

        let change = BalanceChange { account, transaction };
        self.store
            .commit_balance_change(&change)
            .await
            .map_err(|e| fenced_write_error(e, &cmd.account_number))?;

        Ok(change.transaction)
    }

    // =========================================================================
    // Cancel
    // =========================================================================

    /// Fully reverse a successful USE under the account's modify lock
    pub async fn cancel_balance(&self, command: CancelBalanceCommand) -> AppResult<TransactionReceipt> {
        let cmd = &command;
        let transaction = guarded(
            &self.locks,
            &command.lock_target(),
            self.lock_settings,
            move || self.cancel_locked(cmd),
        )
        .await?;

        tracing::info!(
            transaction_id = %transaction.transaction_id,
            reverses = ?transaction.reverses,
            account_number = %transaction.account_number,
            amount = transaction.amount,
            balance = transaction.balance_snapshot,
            "Balance use canceled"
        );

        Ok(TransactionReceipt::from(&transaction))
    }

    async fn cancel_locked(&self, cmd: &CancelBalanceCommand) -> AppResult<Transaction> {
        let original = self.find_transaction(&cmd.transaction_id).await?;
        let mut account = find_account(self.store.as_ref(), &cmd.account_number).await?;

        if original.account_number != cmd.account_number {
            return Err(DomainError::TransactionAccountMismatch {
                transaction_id: original.transaction_id,
                account_number: cmd.account_number.to_string(),
            }
            .into());
        }
        if original.amount != cmd.amount.value() {
            return Err(DomainError::CancelMustBeFull {
                original: original.amount,
                requested: cmd.amount.value(),
            }
            .into());
        }
        if original.canceled {
            return Err(DomainError::TransactionAlreadyCanceled(original.transaction_id).into());
        }
        if !original.is_use() {
            return Err(DomainError::CancelTargetMustBeUse(original.transaction_id).into());
        }
        if !original.is_success() {
            return Err(DomainError::CancelTargetMustSucceed(original.transaction_id).into());
        }

        let balance_after = account
            .deposit(&cmd.amount)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        let transaction = Transaction::cancel_success(&original, &cmd.amount, balance_after);

        let change = BalanceChange { account, transaction };
        self.store
            .commit_balance_change(&change)
            .await
            .map_err(|e| fenced_write_error(e, &cmd.account_number))?;

        Ok(change.transaction)
    }

    // =========================================================================
    // Failure records
    // =========================================================================

    /// Persist a FAILURE record of `transaction_type` against an account,
    /// snapshotting its current balance. Not lock-guarded.
    pub async fn record_failed_use(
        &self,
        transaction_type: TransactionType,
        account_number: &AccountNumber,
        amount: i64,
        error_code: ErrorCode,
    ) -> AppResult<TransactionReceipt> {
        let account = find_account(self.store.as_ref(), account_number).await?;

        let transaction = Transaction::failure(
            transaction_type,
            account.id,
            account.account_number,
            amount,
            account.balance,
            error_code,
        );
        self.store.insert_transaction(&transaction).await?;

        tracing::info!(
            transaction_id = %transaction.transaction_id,
            transaction_type = %transaction_type,
            account_number = %transaction.account_number,
            error_code = %error_code,
            "Failed transaction recorded"
        );

        Ok(TransactionReceipt::from(&transaction))
    }

    // =========================================================================
    // Query
    // =========================================================================

    pub async fn query_transaction(&self, transaction_id: &str) -> AppResult<TransactionDetail> {
        let transaction = self.find_transaction(transaction_id).await?;
        Ok(TransactionDetail::from(&transaction))
    }

    async fn find_transaction(&self, transaction_id: &str) -> AppResult<Transaction> {
        self.store
            .find_transaction(transaction_id)
            .await?
            .ok_or_else(|| DomainError::TransactionNotFound(transaction_id.to_string()).into())
    }
}
