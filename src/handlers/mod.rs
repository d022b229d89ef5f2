//! Services module
//!
//! The account lifecycle and balance transaction services. Each mutating
//! operation runs under its lock and commits its writes as one unit.

mod account_handler;
mod commands;
mod number_generator;
mod settings;
mod transaction_handler;


use crate::domain::{Account, AccountNumber, DomainError, User, UserId};
use crate::error::{AppError, AppResult};
use crate::store::{LedgerStore, StoreError};

pub use account_handler::AccountService;
pub use commands::*;
pub use number_generator::{AccountNumberGenerator, RandomAccountNumberGenerator};
pub use settings::{LedgerSettings, DEFAULT_ACCOUNT_NUMBER_ATTEMPTS, DEFAULT_MAX_ACCOUNTS_PER_USER};
pub use transaction_handler::TransactionService;

async fn find_user(store: &dyn LedgerStore, user_id: UserId) -> AppResult<User> {
    store
        .find_user(user_id)
        .await?
        .ok_or_else(|| DomainError::UserNotFound(user_id).into())
}

async fn find_account(store: &dyn LedgerStore, number: &AccountNumber) -> AppResult<Account> {
    store
        .find_account_by_number(number)
        .await?
        .ok_or_else(|| DomainError::AccountNotFound(number.to_string()).into())
}

/// A write lost to a concurrent writer on the same account. Only possible
/// once a lease has expired under a slow holder.
fn fenced_write_error(err: StoreError, number: &AccountNumber) -> AppError {
    if !err.is_concurrent_modification() {
        return err.into();
    }

    tracing::warn!(account_number = %number, error = %err, "Write fenced after lock lease expired");
    match err {
        StoreError::CancelConflict(transaction_id) => {
            DomainError::TransactionAlreadyCanceled(transaction_id).into()
        }
        _ => DomainError::AccountModificationLocked(number.to_string()).into(),
    }
}
