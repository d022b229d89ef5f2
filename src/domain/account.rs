//! Account entity
//!
//! Accounts are owned by a user, identified externally by a 10-digit
//! account number, and move one way from `IN_USE` to `UNREGISTERED`.
//! Business validation happens in the services; the entity only performs
//! the state transition.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Amount, AmountError, Balance};

/// Number of digits in an account number
pub const ACCOUNT_NUMBER_LENGTH: usize = 10;

/// User identifier (owned by the external user directory)
pub type UserId = i64;

/// A user as seen by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

/// Externally visible account number: exactly ten ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountNumber(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Account number must be exactly {ACCOUNT_NUMBER_LENGTH} digits (got {0:?})")]
pub struct InvalidAccountNumber(pub String);

impl AccountNumber {
    /// Draw a uniformly random number, leading zeros included
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let value = rng.gen_range(0..10u64.pow(ACCOUNT_NUMBER_LENGTH as u32));
        Self(format!("{:0width$}", value, width = ACCOUNT_NUMBER_LENGTH))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccountNumber {
    type Err = InvalidAccountNumber;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == ACCOUNT_NUMBER_LENGTH && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidAccountNumber(s.to_string()))
        }
    }
}

impl TryFrom<String> for AccountNumber {
    type Error = InvalidAccountNumber;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AccountNumber> for String {
    fn from(number: AccountNumber) -> Self {
        number.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    InUse,
    Unregistered,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::InUse => "IN_USE",
            AccountStatus::Unregistered => "UNREGISTERED",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IN_USE" => Ok(AccountStatus::InUse),
            "UNREGISTERED" => Ok(AccountStatus::Unregistered),
            other => Err(format!("unknown account status: {}", other)),
        }
    }
}

/// An account about to be inserted (id and version assigned by the store)
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub user_id: UserId,
    pub account_number: AccountNumber,
    pub balance: Balance,
    pub registered_at: DateTime<Utc>,
}

impl NewAccount {
    pub fn new(user_id: UserId, account_number: AccountNumber, initial_balance: Balance) -> Self {
        Self {
            user_id,
            account_number,
            balance: initial_balance,
            registered_at: Utc::now(),
        }
    }
}

/// Account entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: UserId,
    pub account_number: AccountNumber,
    pub status: AccountStatus,
    pub balance: Balance,
    /// Incremented on every persisted change; used to fence stale writers
    pub version: i64,
    pub registered_at: DateTime<Utc>,
    pub unregistered_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Materialize a freshly inserted account
    pub fn from_new(id: i64, new: NewAccount) -> Self {
        Self {
            id,
            user_id: new.user_id,
            account_number: new.account_number,
            status: AccountStatus::InUse,
            balance: new.balance,
            version: 1,
            registered_at: new.registered_at,
            unregistered_at: None,
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    pub fn is_in_use(&self) -> bool {
        self.status == AccountStatus::InUse
    }

    /// Debit the balance. Callers validate sufficiency beforehand.
    pub fn withdraw(&mut self, amount: &Amount) -> Result<Balance, AmountError> {
        self.balance = self.balance.debit(amount)?;
        Ok(self.balance)
    }

    /// Credit the balance.
    pub fn deposit(&mut self, amount: &Amount) -> Result<Balance, AmountError> {
        self.balance = self.balance.credit(amount)?;
        Ok(self.balance)
    }

    /// Close the account (IN_USE -> UNREGISTERED).
    pub fn unregister(&mut self, at: DateTime<Utc>) {
        self.status = AccountStatus::Unregistered;
        self.unregistered_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(s: &str) -> AccountNumber {
        s.parse().unwrap()
    }

    #[test]
    fn test_account_number_validation() {
        assert!("1234567890".parse::<AccountNumber>().is_ok());
        assert!("123456789".parse::<AccountNumber>().is_err());
        assert!("12345678901".parse::<AccountNumber>().is_err());
        assert!("12345abcde".parse::<AccountNumber>().is_err());
        assert!("１２３４５６７８９０".parse::<AccountNumber>().is_err());
    }

    #[test]
    fn test_account_number_deserialize_rejects_garbage() {
        assert!(serde_json::from_str::<AccountNumber>(r#""12""#).is_err());
        let n: AccountNumber = serde_json::from_str(r#""0000000001""#).unwrap();
        assert_eq!(n.as_str(), "0000000001");
    }

    #[test]
    fn test_random_numbers_are_well_formed() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let n = AccountNumber::random(&mut rng);
            assert!(n.as_str().parse::<AccountNumber>().is_ok());
        }
    }

    #[test]
    fn test_status_text_form() {
        assert_eq!(AccountStatus::InUse.as_str(), "IN_USE");
        assert_eq!("UNREGISTERED".parse::<AccountStatus>(), Ok(AccountStatus::Unregistered));
        assert!("CLOSED".parse::<AccountStatus>().is_err());
    }

    #[test]
    fn test_new_account_starts_in_use() {
        let new = NewAccount::new(1, number("1000000000"), Balance::new(100).unwrap());
        let account = Account::from_new(42, new);

        assert_eq!(account.id, 42);
        assert!(account.is_in_use());
        assert!(account.is_owned_by(1));
        assert!(!account.is_owned_by(2));
        assert_eq!(account.balance.value(), 100);
        assert!(account.unregistered_at.is_none());
    }

    #[test]
    fn test_withdraw_and_deposit() {
        let new = NewAccount::new(1, number("1000000000"), Balance::new(100).unwrap());
        let mut account = Account::from_new(1, new);

        let after = account.withdraw(&Amount::new(40).unwrap()).unwrap();
        assert_eq!(after.value(), 60);

        let after = account.deposit(&Amount::new(40).unwrap()).unwrap();
        assert_eq!(after.value(), 100);

        assert!(account.withdraw(&Amount::new(101).unwrap()).is_err());
        assert_eq!(account.balance.value(), 100);
    }

    #[test]
    fn test_unregister() {
        let new = NewAccount::new(1, number("1000000000"), Balance::zero());
        let mut account = Account::from_new(1, new);
        let now = Utc::now();

        account.unregister(now);

        assert_eq!(account.status, AccountStatus::Unregistered);
        assert_eq!(account.unregistered_at, Some(now));
    }
}
