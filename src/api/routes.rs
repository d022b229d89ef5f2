//! API Routes
//!
//! HTTP endpoint definitions.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AccountNumber, Amount, Balance, InvalidAccountNumber, OperationContext, TransactionType,
    UserId, MAX_AMOUNT,
};
use crate::error::{AppError, AppResult};
use crate::handlers::{
    AccountNumberGenerator, AccountService, AccountSummary, CancelBalanceCommand, CloseAccountCommand,
    CloseAccountResult, CreateAccountCommand, CreateAccountResult, TransactionDetail,
    LedgerSettings, TransactionReceipt, TransactionService, UseBalanceCommand,
};
use crate::lock::LockManager;
use crate::store::LedgerStore;

/// Smallest amount a use or cancel may move
pub const MIN_TRANSACTION_AMOUNT: i64 = 10;

/// Shared state for all routes
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub transactions: Arc<TransactionService>,
}

impl AppState {
    pub fn new(accounts: Arc<AccountService>, transactions: Arc<TransactionService>) -> Self {
        Self {
            accounts,
            transactions,
        }
    }

    /// Wire both services onto one store and lock manager
    pub fn build(
        store: Arc<dyn LedgerStore>,
        locks: Arc<dyn LockManager>,
        numbers: Arc<dyn AccountNumberGenerator>,
        settings: LedgerSettings,
    ) -> Self {
        let transactions = TransactionService::new(store.clone(), locks.clone(), settings.lock);
        let accounts = AccountService::new(store, locks, numbers, settings);

        Self::new(Arc::new(accounts), Arc::new(transactions))
    }
}

// =========================================================================
// Request types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateAccountRequest {
    pub user_id: i64,
    pub initial_balance: i64,
}

impl CreateAccountRequest {
    fn into_command(self) -> AppResult<CreateAccountCommand> {
        let user_id = validate_user_id(self.user_id)?;
        let initial_balance = Balance::new(self.initial_balance)
            .map_err(|_| AppError::InvalidRequest("initial_balance must not be negative".to_string()))?;

        Ok(CreateAccountCommand::new(user_id, initial_balance))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CloseAccountRequest {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct AccountsQuery {
    pub user_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UseBalanceRequest {
    pub user_id: i64,
    pub account_number: String,
    pub amount: i64,
}

impl UseBalanceRequest {
    fn into_command(self) -> AppResult<UseBalanceCommand> {
        Ok(UseBalanceCommand::new(
            validate_user_id(self.user_id)?,
            parse_account_number(&self.account_number)?,
            transaction_amount(self.amount)?,
        ))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelBalanceRequest {
    pub account_number: String,
    pub amount: i64,
}

impl CancelBalanceRequest {
    fn into_command(self, transaction_id: String) -> AppResult<CancelBalanceCommand> {
        if transaction_id.trim().is_empty() {
            return Err(AppError::InvalidRequest("transaction_id must not be blank".to_string()));
        }

        Ok(CancelBalanceCommand::new(
            transaction_id,
            parse_account_number(&self.account_number)?,
            transaction_amount(self.amount)?,
        ))
    }
}

fn validate_user_id(user_id: i64) -> AppResult<UserId> {
    if user_id < 1 {
        return Err(AppError::InvalidRequest("user_id must be at least 1".to_string()));
    }
    Ok(user_id)
}

fn parse_account_number(raw: &str) -> AppResult<AccountNumber> {
    raw.parse()
        .map_err(|e: InvalidAccountNumber| AppError::InvalidRequest(e.to_string()))
}

fn transaction_amount(value: i64) -> AppResult<Amount> {
    if !(MIN_TRANSACTION_AMOUNT..=MAX_AMOUNT).contains(&value) {
        return Err(AppError::InvalidRequest(format!(
            "amount must be between {} and {}",
            MIN_TRANSACTION_AMOUNT, MAX_AMOUNT
        )));
    }
    Amount::new(value).map_err(|e| AppError::InvalidRequest(e.to_string()))
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/accounts", post(create_account).get(list_accounts))
        .route("/accounts/:account_number", delete(close_account))
        .route("/transactions/use", post(use_balance))
        .route("/transactions/:transaction_id/cancel", post(cancel_balance))
        .route("/transactions/:transaction_id", get(get_transaction))
}

// =========================================================================
// Accounts
// =========================================================================

/// POST /accounts
async fn create_account(
    State(state): State<AppState>,
    Json(request): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<CreateAccountResult>), AppError> {
    let command = request.into_command()?;
    let result = state.accounts.create_account(command).await?;

    Ok((StatusCode::CREATED, Json(result)))
}

/// DELETE /accounts/:account_number
async fn close_account(
    State(state): State<AppState>,
    Path(account_number): Path<String>,
    Json(request): Json<CloseAccountRequest>,
) -> Result<Json<CloseAccountResult>, AppError> {
    let command = CloseAccountCommand::new(
        validate_user_id(request.user_id)?,
        parse_account_number(&account_number)?,
    );
    let result = state.accounts.close_account(command).await?;

    Ok(Json(result))
}

/// GET /accounts?user_id=
async fn list_accounts(
    State(state): State<AppState>,
    Query(query): Query<AccountsQuery>,
) -> Result<Json<Vec<AccountSummary>>, AppError> {
    let user_id = validate_user_id(query.user_id)?;
    let accounts = state.accounts.list_accounts(user_id).await?;

    Ok(Json(accounts))
}

// =========================================================================
// Transactions
// =========================================================================

/// POST /transactions/use
async fn use_balance(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<UseBalanceRequest>,
) -> Result<Json<TransactionReceipt>, AppError> {
    let command = request.into_command()?;
    let account_number = command.account_number.clone();
    let amount = command.amount.value();

    match state.transactions.use_balance(command).await {
        Ok(receipt) => Ok(Json(receipt)),
        Err(err) => {
            record_failure(&state, &context, TransactionType::Use, &account_number, amount, &err).await;
            Err(err)
        }
    }
}

/// POST /transactions/:transaction_id/cancel
async fn cancel_balance(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(transaction_id): Path<String>,
    Json(request): Json<CancelBalanceRequest>,
) -> Result<Json<TransactionReceipt>, AppError> {
    let command = request.into_command(transaction_id)?;
    let account_number = command.account_number.clone();
    let amount = command.amount.value();

    match state.transactions.cancel_balance(command).await {
        Ok(receipt) => Ok(Json(receipt)),
        Err(err) => {
            record_failure(&state, &context, TransactionType::Cancel, &account_number, amount, &err).await;
            Err(err)
        }
    }
}

/// GET /transactions/:transaction_id
async fn get_transaction(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<TransactionDetail>, AppError> {
    let detail = state.transactions.query_transaction(&transaction_id).await?;

    Ok(Json(detail))
}

/// Leave a FAILURE record for a rejected use or cancel. Busy locks are not
/// recorded, and a failure here never replaces the original error.
async fn record_failure(
    state: &AppState,
    context: &OperationContext,
    transaction_type: TransactionType,
    account_number: &AccountNumber,
    amount: i64,
    err: &AppError,
) {
    let Some(domain) = err.as_domain() else {
        return;
    };
    if domain.is_lock_contention() {
        return;
    }

    if let Err(audit_err) = state
        .transactions
        .record_failed_use(transaction_type, account_number, amount, domain.code())
        .await
    {
        tracing::warn!(
            correlation_id = ?context.correlation_id,
            account_number = %account_number,
            original_error = %domain,
            error = %audit_err,
            "Could not record failed transaction"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use crate::domain::{ErrorCode, User};
    use crate::handlers::RandomAccountNumberGenerator;
    use crate::lock::InMemoryLockManager;
    use crate::store::testing::InstrumentedStore;
    use crate::store::InMemoryStore;

    #[test]
    fn test_create_account_request_validation() {
        let ok = CreateAccountRequest { user_id: 1, initial_balance: 0 }.into_command().unwrap();
        assert_eq!(ok.initial_balance.value(), 0);

        let err = CreateAccountRequest { user_id: 0, initial_balance: 100 }.into_command().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);

        let err = CreateAccountRequest { user_id: 1, initial_balance: -1 }.into_command().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_transaction_amount_bounds() {
        assert!(transaction_amount(9).is_err());
        assert!(transaction_amount(10).is_ok());
        assert!(transaction_amount(1_000_000_000).is_ok());
        assert!(transaction_amount(1_000_000_001).is_err());
    }

    #[test]
    fn test_use_request_requires_ten_digit_account() {
        let request = UseBalanceRequest {
            user_id: 1,
            account_number: "12345".to_string(),
            amount: 100,
        };
        assert_eq!(request.into_command().unwrap_err().code(), ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_cancel_request_rejects_blank_id() {
        let request = CancelBalanceRequest {
            account_number: "1234567890".to_string(),
            amount: 100,
        };
        assert!(request.into_command("  ".to_string()).is_err());
    }

    /// Router whose store accepts everything except transaction inserts
    async fn app_with_failing_audit() -> (Router, Arc<InMemoryStore>, AccountNumber) {
        let inner = Arc::new(InMemoryStore::with_users((1..=2).map(|id| User {
            id,
            name: format!("user-{}", id),
        })));
        let store = Arc::new(InstrumentedStore::new(inner.clone()));
        let state = AppState::build(
            store.clone(),
            Arc::new(InMemoryLockManager::new()),
            Arc::new(RandomAccountNumberGenerator::with_seed(5)),
            LedgerSettings::default(),
        );

        let created = state
            .accounts
            .create_account(CreateAccountCommand::new(1, Balance::new(500).unwrap()))
            .await
            .unwrap();
        store.reject_inserts();

        (crate::build_router(state), inner, created.account_number)
    }

    async fn post_use(router: Router, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/transactions/use")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_failed_audit_write_keeps_original_error() {
        let (router, inner, account_number) = app_with_failing_audit().await;

        // Owner mismatch, while the FAILURE insert errors with a store error
        let (status, body) = post_use(
            router.clone(),
            json!({ "user_id": 2, "account_number": account_number, "amount": 100 }),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error_code"], "owner_mismatch");

        let (status, body) = post_use(
            router,
            json!({ "user_id": 1, "account_number": account_number, "amount": 600 }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_code"], "amount_exceeds_balance");

        assert!(inner.transactions_for(&account_number).is_empty());
    }
}
