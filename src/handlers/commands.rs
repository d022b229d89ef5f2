//! Command definitions
//!
//! Commands carry already-validated input into the services. Results are the
//! read-only projections the services hand back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Account, AccountNumber, Amount, Balance, Transaction, TransactionResult, TransactionType,
    UserId,
};
use crate::lock::LockTarget;

// =========================================================================
// Account commands
// =========================================================================

/// Command to open a new account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccountCommand {
    pub user_id: UserId,
    pub initial_balance: Balance,
}

impl CreateAccountCommand {
    pub fn new(user_id: UserId, initial_balance: Balance) -> Self {
        Self {
            user_id,
            initial_balance,
        }
    }
}

/// Command to close (unregister) an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseAccountCommand {
    pub user_id: UserId,
    pub account_number: AccountNumber,
}

impl CloseAccountCommand {
    pub fn new(user_id: UserId, account_number: AccountNumber) -> Self {
        Self {
            user_id,
            account_number,
        }
    }

    pub fn lock_target(&self) -> LockTarget {
        LockTarget::ModifyAccount(self.account_number.clone())
    }
}

// =========================================================================
// Balance commands
// =========================================================================

/// Command to debit an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UseBalanceCommand {
    pub user_id: UserId,
    pub account_number: AccountNumber,
    pub amount: Amount,
}

impl UseBalanceCommand {
    pub fn new(user_id: UserId, account_number: AccountNumber, amount: Amount) -> Self {
        Self {
            user_id,
            account_number,
            amount,
        }
    }

    pub fn lock_target(&self) -> LockTarget {
        LockTarget::ModifyAccount(self.account_number.clone())
    }
}

/// Command to fully reverse a prior USE
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelBalanceCommand {
    pub transaction_id: String,
    pub account_number: AccountNumber,
    pub amount: Amount,
}

impl CancelBalanceCommand {
    pub fn new(transaction_id: String, account_number: AccountNumber, amount: Amount) -> Self {
        Self {
            transaction_id,
            account_number,
            amount,
        }
    }

    /// Locks the account named in the request, not the one on the original record
    pub fn lock_target(&self) -> LockTarget {
        LockTarget::ModifyAccount(self.account_number.clone())
    }
}

// =========================================================================
// Results
// =========================================================================

/// Result of a successful account creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateAccountResult {
    pub user_id: UserId,
    pub account_number: AccountNumber,
    pub registered_at: DateTime<Utc>,
}

/// Result of a successful account closure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseAccountResult {
    pub user_id: UserId,
    pub account_number: AccountNumber,
    pub unregistered_at: DateTime<Utc>,
}

/// One entry of a user's account list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub account_number: AccountNumber,
    pub balance: i64,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            account_number: account.account_number.clone(),
            balance: account.balance.value(),
        }
    }
}

/// Outcome of a use or cancel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub account_number: AccountNumber,
    pub transaction_result: TransactionResult,
    pub transaction_id: String,
    pub amount: i64,
    pub balance_snapshot: i64,
    pub transacted_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionReceipt {
    fn from(txn: &Transaction) -> Self {
        Self {
            account_number: txn.account_number.clone(),
            transaction_result: txn.result,
            transaction_id: txn.transaction_id.clone(),
            amount: txn.amount,
            balance_snapshot: txn.balance_snapshot,
            transacted_at: txn.transacted_at,
        }
    }
}

/// Read-only view of a stored transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDetail {
    pub account_number: AccountNumber,
    pub transaction_type: TransactionType,
    pub transaction_result: TransactionResult,
    pub transaction_id: String,
    pub amount: i64,
    pub balance_snapshot: i64,
    pub transacted_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionDetail {
    fn from(txn: &Transaction) -> Self {
        Self {
            account_number: txn.account_number.clone(),
            transaction_type: txn.transaction_type,
            transaction_result: txn.result,
            transaction_id: txn.transaction_id.clone(),
            amount: txn.amount,
            balance_snapshot: txn.balance_snapshot,
            transacted_at: txn.transacted_at,
        }
    }
}
