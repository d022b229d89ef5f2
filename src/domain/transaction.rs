//! Transaction entity
//!
//! Every attempted balance mutation leaves a transaction record, successful or
//! not. Records are immutable apart from the `canceled` marker on a USE whose
//! CANCEL succeeded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{AccountNumber, Amount, Balance, ErrorCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Use,
    Cancel,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Use => "USE",
            TransactionType::Cancel => "CANCEL",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USE" => Ok(TransactionType::Use),
            "CANCEL" => Ok(TransactionType::Cancel),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

/// Outcome of a transaction attempt (`S` / `F` on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionResult {
    #[serde(rename = "S")]
    Success,
    #[serde(rename = "F")]
    Failure,
}

impl TransactionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionResult::Success => "S",
            TransactionResult::Failure => "F",
        }
    }
}

impl fmt::Display for TransactionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S" => Ok(TransactionResult::Success),
            "F" => Ok(TransactionResult::Failure),
            other => Err(format!("unknown transaction result: {}", other)),
        }
    }
}

/// Generate a fresh transaction identifier: 32 lowercase hex characters of a
/// random (v4) UUID.
pub fn new_transaction_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Transaction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub transaction_type: TransactionType,
    pub result: TransactionResult,
    /// Set iff `result` is `Failure`
    pub error_code: Option<ErrorCode>,
    pub account_id: i64,
    pub account_number: AccountNumber,
    pub amount: i64,
    /// Balance after applying this transaction (current balance for failures)
    pub balance_snapshot: i64,
    /// For CANCEL records: the USE transaction being reversed
    pub reverses: Option<String>,
    /// For USE records: whether a CANCEL has reversed it
    pub canceled: bool,
    pub transacted_at: DateTime<Utc>,
}

impl Transaction {
    /// A successful debit
    pub fn use_success(
        account_id: i64,
        account_number: AccountNumber,
        amount: &Amount,
        balance_after: Balance,
    ) -> Self {
        Self {
            transaction_id: new_transaction_id(),
            transaction_type: TransactionType::Use,
            result: TransactionResult::Success,
            error_code: None,
            account_id,
            account_number,
            amount: amount.value(),
            balance_snapshot: balance_after.value(),
            reverses: None,
            canceled: false,
            transacted_at: Utc::now(),
        }
    }

    /// A successful reversal of `original`
    pub fn cancel_success(
        original: &Transaction,
        amount: &Amount,
        balance_after: Balance,
    ) -> Self {
        Self {
            transaction_id: new_transaction_id(),
            transaction_type: TransactionType::Cancel,
            result: TransactionResult::Success,
            error_code: None,
            account_id: original.account_id,
            account_number: original.account_number.clone(),
            amount: amount.value(),
            balance_snapshot: balance_after.value(),
            reverses: Some(original.transaction_id.clone()),
            canceled: false,
            transacted_at: Utc::now(),
        }
    }

    /// A failed attempt, snapshotting the unchanged balance
    pub fn failure(
        transaction_type: TransactionType,
        account_id: i64,
        account_number: AccountNumber,
        amount: i64,
        current_balance: Balance,
        error_code: ErrorCode,
    ) -> Self {
        Self {
            transaction_id: new_transaction_id(),
            transaction_type,
            result: TransactionResult::Failure,
            error_code: Some(error_code),
            account_id,
            account_number,
            amount,
            balance_snapshot: current_balance.value(),
            reverses: None,
            canceled: false,
            transacted_at: Utc::now(),
        }
    }

    pub fn is_use(&self) -> bool {
        self.transaction_type == TransactionType::Use
    }

    pub fn is_success(&self) -> bool {
        self.result == TransactionResult::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number() -> AccountNumber {
        "1000000000".parse().unwrap()
    }

    #[test]
    fn test_transaction_id_shape() {
        let id = new_transaction_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_transaction_id());
    }

    #[test]
    fn test_use_success_record() {
        let txn = Transaction::use_success(
            1,
            number(),
            &Amount::new(1000).unwrap(),
            Balance::new(9000).unwrap(),
        );

        assert!(txn.is_use());
        assert!(txn.is_success());
        assert_eq!(txn.balance_snapshot, 9000);
        assert!(txn.error_code.is_none());
        assert!(!txn.canceled);
    }

    #[test]
    fn test_cancel_links_original() {
        let original = Transaction::use_success(
            1,
            number(),
            &Amount::new(1000).unwrap(),
            Balance::new(9000).unwrap(),
        );
        let cancel =
            Transaction::cancel_success(&original, &Amount::new(1000).unwrap(), Balance::new(10000).unwrap());

        assert_eq!(cancel.transaction_type, TransactionType::Cancel);
        assert_eq!(cancel.reverses.as_deref(), Some(original.transaction_id.as_str()));
        assert_eq!(cancel.account_number, original.account_number);
        assert_eq!(cancel.balance_snapshot, 10000);
    }

    #[test]
    fn test_failure_record_carries_code() {
        let txn = Transaction::failure(
            TransactionType::Use,
            1,
            number(),
            5000,
            Balance::new(100).unwrap(),
            ErrorCode::AmountExceedsBalance,
        );

        assert_eq!(txn.result, TransactionResult::Failure);
        assert_eq!(txn.error_code, Some(ErrorCode::AmountExceedsBalance));
        assert_eq!(txn.balance_snapshot, 100);
        assert_eq!(txn.amount, 5000);
    }

    #[test]
    fn test_result_wire_form() {
        assert_eq!(serde_json::to_string(&TransactionResult::Success).unwrap(), r#""S""#);
        assert_eq!("F".parse::<TransactionResult>(), Ok(TransactionResult::Failure));
        assert_eq!(serde_json::to_string(&TransactionType::Cancel).unwrap(), r#""CANCEL""#);
    }
}
