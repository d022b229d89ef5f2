//! Domain module
//!
//! Core domain types: money primitives, accounts, transactions and the error
//! taxonomy.

pub mod account;
pub mod amount;
pub mod context;
pub mod error;
pub mod transaction;

pub use account::{
    Account, AccountNumber, AccountStatus, InvalidAccountNumber, NewAccount, User, UserId,
    ACCOUNT_NUMBER_LENGTH,
};
pub use amount::{Amount, AmountError, Balance, MAX_AMOUNT};
pub use context::OperationContext;
pub use error::{DomainError, ErrorCode};
pub use transaction::{new_transaction_id, Transaction, TransactionResult, TransactionType};
