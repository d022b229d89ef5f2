//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Stable machine-readable error code.
///
/// Rendered in error responses and persisted on FAILURE transaction records,
/// so the string forms must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UserNotFound,
    AccountNotFound,
    TransactionNotFound,
    OwnerMismatch,
    AlreadyUnregistered,
    BalanceNotEmpty,
    MaxAccountsPerUser,
    AccountNumberAlreadyExists,
    AmountExceedsBalance,
    TransactionAccountMismatch,
    CancelMustBeFull,
    TransactionAlreadyCanceled,
    CancelTargetMustBeUse,
    CancelTargetMustSucceed,
    AccountCreationLocked,
    AccountModificationLocked,
    InvalidRequest,
    InternalError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 18] = [
        ErrorCode::UserNotFound,
        ErrorCode::AccountNotFound,
        ErrorCode::TransactionNotFound,
        ErrorCode::OwnerMismatch,
        ErrorCode::AlreadyUnregistered,
        ErrorCode::BalanceNotEmpty,
        ErrorCode::MaxAccountsPerUser,
        ErrorCode::AccountNumberAlreadyExists,
        ErrorCode::AmountExceedsBalance,
        ErrorCode::TransactionAccountMismatch,
        ErrorCode::CancelMustBeFull,
        ErrorCode::TransactionAlreadyCanceled,
        ErrorCode::CancelTargetMustBeUse,
        ErrorCode::CancelTargetMustSucceed,
        ErrorCode::AccountCreationLocked,
        ErrorCode::AccountModificationLocked,
        ErrorCode::InvalidRequest,
        ErrorCode::InternalError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UserNotFound => "user_not_found",
            ErrorCode::AccountNotFound => "account_not_found",
            ErrorCode::TransactionNotFound => "transaction_not_found",
            ErrorCode::OwnerMismatch => "owner_mismatch",
            ErrorCode::AlreadyUnregistered => "already_unregistered",
            ErrorCode::BalanceNotEmpty => "balance_not_empty",
            ErrorCode::MaxAccountsPerUser => "max_accounts_per_user",
            ErrorCode::AccountNumberAlreadyExists => "account_number_already_exists",
            ErrorCode::AmountExceedsBalance => "amount_exceeds_balance",
            ErrorCode::TransactionAccountMismatch => "transaction_account_mismatch",
            ErrorCode::CancelMustBeFull => "cancel_must_be_full",
            ErrorCode::TransactionAlreadyCanceled => "transaction_already_canceled",
            ErrorCode::CancelTargetMustBeUse => "cancel_target_must_be_use",
            ErrorCode::CancelTargetMustSucceed => "cancel_target_must_succeed",
            ErrorCode::AccountCreationLocked => "account_creation_locked",
            ErrorCode::AccountModificationLocked => "account_modification_locked",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::InternalError => "internal_error",
        }
    }

    /// Human-readable description shown to clients
    pub fn description(&self) -> &'static str {
        match self {
            ErrorCode::UserNotFound => "User does not exist",
            ErrorCode::AccountNotFound => "Account does not exist",
            ErrorCode::TransactionNotFound => "Transaction does not exist",
            ErrorCode::OwnerMismatch => "Account does not belong to the user",
            ErrorCode::AlreadyUnregistered => "Account is already unregistered",
            ErrorCode::BalanceNotEmpty => "Account with remaining balance cannot be unregistered",
            ErrorCode::MaxAccountsPerUser => "User already owns the maximum number of accounts",
            ErrorCode::AccountNumberAlreadyExists => "Account number already exists",
            ErrorCode::AmountExceedsBalance => "Amount exceeds account balance",
            ErrorCode::TransactionAccountMismatch => "Transaction does not belong to the account",
            ErrorCode::CancelMustBeFull => "Only the full transaction amount can be canceled",
            ErrorCode::TransactionAlreadyCanceled => "Transaction is already canceled",
            ErrorCode::CancelTargetMustBeUse => "Only use transactions can be canceled",
            ErrorCode::CancelTargetMustSucceed => "Only successful transactions can be canceled",
            ErrorCode::AccountCreationLocked => "Another account is being created, try again",
            ErrorCode::AccountModificationLocked => "Account is being modified, try again",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCode::ALL
            .iter()
            .find(|code| code.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown error code: {}", s))
    }
}

/// Domain-specific errors
///
/// These errors represent business rule violations and domain invariant failures.
/// They are independent of the web/infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Account {account_number} does not belong to user {user_id}")]
    OwnerMismatch { user_id: i64, account_number: String },

    #[error("Account is already unregistered: {0}")]
    AlreadyUnregistered(String),

    #[error("Account balance is not empty: {balance}")]
    BalanceNotEmpty { balance: i64 },

    #[error("User {user_id} already owns {limit} accounts")]
    MaxAccountsPerUser { user_id: i64, limit: u32 },

    #[error("Account number already exists")]
    AccountNumberAlreadyExists,

    #[error("Amount exceeds balance: requested {requested}, available {available}")]
    AmountExceedsBalance { requested: i64, available: i64 },

    #[error("Transaction {transaction_id} does not belong to account {account_number}")]
    TransactionAccountMismatch {
        transaction_id: String,
        account_number: String,
    },

    #[error("Cancel must be full: transaction amount {original}, requested {requested}")]
    CancelMustBeFull { original: i64, requested: i64 },

    #[error("Transaction is already canceled: {0}")]
    TransactionAlreadyCanceled(String),

    #[error("Only use transactions can be canceled: {0}")]
    CancelTargetMustBeUse(String),

    #[error("Only successful transactions can be canceled: {0}")]
    CancelTargetMustSucceed(String),

    #[error("Account creation is in progress elsewhere")]
    AccountCreationLocked,

    #[error("Account is being modified: {0}")]
    AccountModificationLocked(String),
}

impl DomainError {
    /// Create an amount-exceeds-balance error
    pub fn amount_exceeds_balance(requested: i64, available: i64) -> Self {
        Self::AmountExceedsBalance { requested, available }
    }

    /// The stable code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UserNotFound(_) => ErrorCode::UserNotFound,
            Self::AccountNotFound(_) => ErrorCode::AccountNotFound,
            Self::TransactionNotFound(_) => ErrorCode::TransactionNotFound,
            Self::OwnerMismatch { .. } => ErrorCode::OwnerMismatch,
            Self::AlreadyUnregistered(_) => ErrorCode::AlreadyUnregistered,
            Self::BalanceNotEmpty { .. } => ErrorCode::BalanceNotEmpty,
            Self::MaxAccountsPerUser { .. } => ErrorCode::MaxAccountsPerUser,
            Self::AccountNumberAlreadyExists => ErrorCode::AccountNumberAlreadyExists,
            Self::AmountExceedsBalance { .. } => ErrorCode::AmountExceedsBalance,
            Self::TransactionAccountMismatch { .. } => ErrorCode::TransactionAccountMismatch,
            Self::CancelMustBeFull { .. } => ErrorCode::CancelMustBeFull,
            Self::TransactionAlreadyCanceled(_) => ErrorCode::TransactionAlreadyCanceled,
            Self::CancelTargetMustBeUse(_) => ErrorCode::CancelTargetMustBeUse,
            Self::CancelTargetMustSucceed(_) => ErrorCode::CancelTargetMustSucceed,
            Self::AccountCreationLocked => ErrorCode::AccountCreationLocked,
            Self::AccountModificationLocked(_) => ErrorCode::AccountModificationLocked,
        }
    }

    /// Check if this error means a lock could not be obtained (retry may help)
    pub fn is_lock_contention(&self) -> bool {
        matches!(
            self,
            Self::AccountCreationLocked | Self::AccountModificationLocked(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_exceeds_balance_error() {
        let err = DomainError::amount_exceeds_balance(100, 50);

        assert_eq!(err.code(), ErrorCode::AmountExceedsBalance);
        assert!(!err.is_lock_contention());
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_lock_errors_are_contention() {
        assert!(DomainError::AccountCreationLocked.is_lock_contention());
        assert!(DomainError::AccountModificationLocked("1234567890".into()).is_lock_contention());
        assert!(!DomainError::AccountNumberAlreadyExists.is_lock_contention());
    }

    #[test]
    fn test_stored_error_code_parses() {
        let parsed: ErrorCode = "cancel_must_be_full".parse().unwrap();
        assert_eq!(parsed, ErrorCode::CancelMustBeFull);
        assert!("CANCEL_MUST_FULLY".parse::<ErrorCode>().is_err());
    }

    #[test]
    fn test_error_code_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorCode::AccountModificationLocked).unwrap();
        assert_eq!(json, r#""account_modification_locked""#);
    }
}
