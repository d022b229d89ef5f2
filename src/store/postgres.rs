//! Postgres store
//!
//! sqlx-backed implementation of the ledger stores. Balance changes run in a
//! single database transaction with an optimistic version check on the
//! account row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};

use crate::domain::{
    Account, AccountNumber, AccountStatus, Balance, ErrorCode, NewAccount, Transaction,
    TransactionResult, TransactionType, User, UserId,
};

use super::{
    AccountStore, BalanceChange, LedgerStore, StoreError, StoreResult, TransactionStore,
    UserStore,
};

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: i64,
    user_id: i64,
    account_number: String,
    status: String,
    balance: i64,
    version: i64,
    registered_at: DateTime<Utc>,
    unregistered_at: Option<DateTime<Utc>>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: row.id,
            user_id: row.user_id,
            account_number: row
                .account_number
                .parse()
                .map_err(|e: crate::domain::InvalidAccountNumber| StoreError::Corrupt(e.to_string()))?,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            balance: Balance::new(row.balance).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            version: row.version,
            registered_at: row.registered_at,
            unregistered_at: row.unregistered_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    transaction_id: String,
    transaction_type: String,
    result: String,
    error_code: Option<String>,
    account_id: i64,
    account_number: String,
    amount: i64,
    balance_snapshot: i64,
    reverses: Option<String>,
    canceled: bool,
    transacted_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let error_code = row
            .error_code
            .map(|code| code.parse::<ErrorCode>())
            .transpose()
            .map_err(StoreError::Corrupt)?;

        Ok(Transaction {
            transaction_id: row.transaction_id,
            transaction_type: row
                .transaction_type
                .parse::<TransactionType>()
                .map_err(StoreError::Corrupt)?,
            result: row.result.parse::<TransactionResult>().map_err(StoreError::Corrupt)?,
            error_code,
            account_id: row.account_id,
            account_number: row
                .account_number
                .parse()
                .map_err(|e: crate::domain::InvalidAccountNumber| StoreError::Corrupt(e.to_string()))?,
            amount: row.amount,
            balance_snapshot: row.balance_snapshot,
            reverses: row.reverses,
            canceled: row.canceled,
            transacted_at: row.transacted_at,
        })
    }
}

const ACCOUNT_COLUMNS: &str = r#"
    id, user_id, account_number, status, balance, version, registered_at, unregistered_at
"#;

const TRANSACTION_SELECT: &str = r#"
    SELECT
        t.transaction_id, t.transaction_type, t.result, t.error_code,
        t.account_id, a.account_number, t.amount, t.balance_snapshot,
        t.reverses, t.canceled, t.transacted_at
    FROM transactions t
    JOIN accounts a ON a.id = t.account_id
"#;

/// Store backed by Postgres
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PgStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_transaction_in<'e, E>(executor: E, transaction: &Transaction) -> StoreResult<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                transaction_id, transaction_type, result, error_code,
                account_id, amount, balance_snapshot, reverses, canceled, transacted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&transaction.transaction_id)
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.result.as_str())
        .bind(transaction.error_code.map(|c| c.as_str()))
        .bind(transaction.account_id)
        .bind(transaction.amount)
        .bind(transaction.balance_snapshot)
        .bind(&transaction.reverses)
        .bind(transaction.canceled)
        .bind(transaction.transacted_at)
        .execute(executor)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(())
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        let user: Option<(i64, String)> =
            sqlx::query_as("SELECT id, name FROM account_users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(user.map(|(id, name)| User { id, name }))
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_account(&self, account: NewAccount) -> StoreResult<Account> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO accounts (user_id, account_number, status, balance, version, registered_at)
            VALUES ($1, $2, 'IN_USE', $3, 1, $4)
            RETURNING id
            "#,
        )
        .bind(account.user_id)
        .bind(account.account_number.as_str())
        .bind(account.balance.value())
        .bind(account.registered_at)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(Account::from_new(id, account))
    }

    async fn find_account_by_number(&self, number: &AccountNumber) -> StoreResult<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE account_number = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Account::try_from).transpose()
    }

    async fn account_number_exists(&self, number: &AccountNumber) -> StoreResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE account_number = $1)")
                .bind(number.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn update_account(&self, account: &Account) -> StoreResult<Account> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            r#"
            UPDATE accounts
            SET status = $1, balance = $2, unregistered_at = $3, version = version + 1
            WHERE id = $4 AND version = $5
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account.status.as_str())
        .bind(account.balance.value())
        .bind(account.unregistered_at)
        .bind(account.id)
        .bind(account.version)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(StoreError::VersionConflict {
            account_id: account.id,
            expected: account.version,
        })?
        .try_into()
    }

    async fn list_accounts_by_owner_and_status(
        &self,
        user_id: UserId,
        status: AccountStatus,
    ) -> StoreResult<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {} FROM accounts WHERE user_id = $1 AND status = $2 ORDER BY id",
            ACCOUNT_COLUMNS
        ))
        .bind(user_id)
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Account::try_from).collect()
    }

    async fn count_accounts_by_owner_and_status(
        &self,
        user_id: UserId,
        status: AccountStatus,
    ) -> StoreResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM accounts WHERE user_id = $1 AND status = $2")
                .bind(user_id)
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl TransactionStore for PgStore {
    async fn insert_transaction(&self, transaction: &Transaction) -> StoreResult<()> {
        Self::insert_transaction_in(&self.pool, transaction).await
    }

    async fn find_transaction(&self, transaction_id: &str) -> StoreResult<Option<Transaction>> {
        let row: Option<TransactionRow> =
            sqlx::query_as(&format!("{} WHERE t.transaction_id = $1", TRANSACTION_SELECT))
                .bind(transaction_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Transaction::try_from).transpose()
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn commit_balance_change(&self, change: &BalanceChange) -> StoreResult<Account> {
        let account = &change.account;

        // Dropping `tx` on any early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        let row: Option<AccountRow> = sqlx::query_as(&format!(
            r#"
            UPDATE accounts
            SET balance = $1, version = version + 1
            WHERE id = $2 AND version = $3
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(account.balance.value())
        .bind(account.id)
        .bind(account.version)
        .fetch_optional(&mut *tx)
        .await?;

        let stored: Account = row
            .ok_or(StoreError::VersionConflict {
                account_id: account.id,
                expected: account.version,
            })?
            .try_into()?;

        if let Some(original_id) = &change.transaction.reverses {
            let marked = sqlx::query(
                r#"
                UPDATE transactions
                SET canceled = TRUE
                WHERE transaction_id = $1 AND canceled = FALSE
                "#,
            )
            .bind(original_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if marked == 0 {
                return Err(StoreError::CancelConflict(original_id.clone()));
            }
        }

        Self::insert_transaction_in(&mut *tx, &change.transaction).await?;

        tx.commit().await?;

        Ok(stored)
    }
}
